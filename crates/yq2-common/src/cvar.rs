// cvar.rs — dynamic variable tracking

use std::collections::HashMap;

use crate::common::com_printf;
use crate::q_shared::{CVAR_LATCH, CVAR_NOSET};

/// A console variable.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub default_string: String,
    pub latched_string: Option<String>,
    pub flags: i32,
    pub modified: bool,
    pub value: f32,
}

/// The cvar store. Renderers register their variables here and read
/// values back once per frame.
#[derive(Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.find_var_index(name).map(|idx| &self.cvar_vars[idx])
    }

    pub fn find_var_mut(&mut self, name: &str) -> Option<&mut Cvar> {
        let idx = self.find_var_index(name)?;
        Some(&mut self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// Non-zero value test, the usual way boolean toggles are read.
    pub fn is_set(&self, name: &str) -> bool {
        self.variable_value(name) != 0.0
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: i32) -> usize {
        if let Some(idx) = self.find_var_index(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            default_string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    /// Set a cvar value. Write protected cvars are left alone and latched
    /// ones keep the new value aside until `get_latched_vars`.
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, 0),
        };
        let var = &mut self.cvar_vars[idx];

        if var.flags & CVAR_NOSET != 0 {
            com_printf(&format!("{} is write protected.\n", name));
            return idx;
        }

        if var.flags & CVAR_LATCH != 0 {
            let unchanged = match var.latched_string {
                Some(ref latched) => value == latched,
                None => value == var.string,
            };
            if !unchanged {
                com_printf(&format!("{} will be changed on renderer restart.\n", name));
                var.latched_string = Some(value.to_string());
            }
            return idx;
        }

        if value == var.string {
            return idx; // not changed
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        idx
    }

    /// Apply all latched variable changes.
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.cvar_vars {
            if let Some(latched) = var.latched_string.take() {
                var.value = parse_value(&latched);
                var.string = latched;
                var.modified = true;
            }
        }
    }

    /// Returns and clears the modified flag of a cvar.
    pub fn take_modified(&mut self, name: &str) -> bool {
        match self.find_var_mut(name) {
            Some(var) => std::mem::take(&mut var.modified),
            None => false,
        }
    }
}
