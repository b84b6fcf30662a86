// Module / local-symbol scoping.
//
// Grounded on the teacher's `aex::scope` scope-stack module, generalized
// from lexical variable scoping to spec §4.5's `MODULE name` / `ENDMOD`
// pair: a stack of active module names, the top of which is prepended
// to local identifiers (those starting with `.` or `_`) so they are
// unique per module (spec §3, Scope).

pub struct ModuleScope {
    stack: Vec<String>,
}

impl ModuleScope {
    pub fn new() -> Self {
        ModuleScope { stack: Vec::new() }
    }

    pub fn push(&mut self, name: &str) {
        self.stack.push(name.to_string());
    }

    pub fn pop(&mut self) -> Result<(), String> {
        if self.stack.pop().is_none() {
            return Err("ENDMOD with no matching MODULE".to_string());
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.stack.clear();
    }

    pub fn current(&self) -> Option<&str> {
        self.stack.last().map(|s| s.as_str())
    }

    /// Qualifies a local identifier (leading `.` or `_`) with the active
    /// module name. Non-local identifiers pass through unchanged.
    pub fn qualify<'a>(&self, name: &'a str) -> String {
        if name.starts_with('.') || name.starts_with('_') {
            if let Some(module) = self.current() {
                return format!("{module}{name}");
            }
        }
        name.to_string()
    }

    /// BSO-compatibility `NN$` numeric local labels, always qualified by
    /// the enclosing module regardless of leading-character rules.
    pub fn qualify_bso_local(&self, name: &str) -> String {
        match self.current() {
            Some(module) => format!("{module}_{name}"),
            None => name.to_string(),
        }
    }
}

impl Default for ModuleScope {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifies_local_identifiers() {
        let mut s = ModuleScope::new();
        s.push("MAIN");
        assert_eq!(s.qualify(".loop"), "MAIN.loop");
        assert_eq!(s.qualify("GLOBAL"), "GLOBAL");
    }

    #[test]
    fn push_pop_restores_outer_scope() {
        let mut s = ModuleScope::new();
        s.push("A");
        s.push("B");
        assert_eq!(s.current(), Some("B"));
        s.pop().unwrap();
        assert_eq!(s.current(), Some("A"));
        s.pop().unwrap();
        assert_eq!(s.current(), None);
    }

    #[test]
    fn unmatched_endmod_errors() {
        let mut s = ModuleScope::new();
        assert!(s.pop().is_err());
    }

    #[test]
    fn bso_numeric_local_qualified_with_underscore() {
        let mut s = ModuleScope::new();
        s.push("MOD");
        assert_eq!(s.qualify_bso_local("10$"), "MOD_10$");
    }
}
