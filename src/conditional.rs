// Conditional-assembly preprocessor.
//
// Grounded on spec §4.7: a fixed-depth stack of skip flags for
// `#if`/`#ifdef`/`#ifndef`/`#else`/`#endif`, plus `#error`, which only
// fires in pass 1 and only when not currently being skipped. The stack
// depth cap mirrors `src/source.rs`'s include-depth cap in spirit (a
// fixed, generous bound rather than unbounded recursion).

pub const MAX_DEPTH: usize = 10;

#[derive(Clone, Copy, Debug)]
struct Frame {
    /// This frame's own branch is currently active (condition was true,
    /// or this is the `#else` side of a previously-false condition).
    taken:       bool,
    /// An earlier sibling branch in this same `#if`/`#else` chain has
    /// already been taken, so a later `#else` must not be.
    any_taken:   bool,
    saw_else:    bool,
}

pub struct ConditionalStack {
    frames: Vec<Frame>,
}

impl ConditionalStack {
    pub fn new() -> Self {
        ConditionalStack { frames: Vec::new() }
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// True while any enclosing frame's branch is not taken — i.e. lines
    /// should be parsed only far enough to track nesting, not assembled.
    pub fn is_skipping(&self) -> bool {
        self.frames.iter().any(|f| !f.taken)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_if(&mut self, condition_true: bool) -> Result<(), String> {
        if self.frames.len() >= MAX_DEPTH {
            return Err(format!("conditional-assembly nesting too deep (max {MAX_DEPTH})"));
        }
        let parent_active = !self.is_skipping();
        let taken = parent_active && condition_true;
        self.frames.push(Frame { taken, any_taken: taken, saw_else: false });
        Ok(())
    }

    pub fn do_else(&mut self) -> Result<(), String> {
        let parent_active = self.frames.len() < 2 || self.frames[..self.frames.len() - 1].iter().all(|f| f.taken);
        let frame = self.frames.last_mut().ok_or("#else with no matching #if")?;
        if frame.saw_else {
            return Err("multiple #else for one #if".to_string());
        }
        frame.saw_else = true;
        frame.taken = parent_active && !frame.any_taken;
        if frame.taken {
            frame.any_taken = true;
        }
        Ok(())
    }

    pub fn do_endif(&mut self) -> Result<(), String> {
        if self.frames.pop().is_none() {
            return Err("#endif with no matching #if".to_string());
        }
        Ok(())
    }

    /// Whether an `#error` encountered right now should actually fire:
    /// only on pass 1, and only when this frame (and all enclosing ones)
    /// are currently active (spec §4.7/§9).
    pub fn should_fire_error(&self, pass: u32) -> bool {
        pass == 1 && !self.is_skipping()
    }
}

impl Default for ConditionalStack {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_branch_is_not_skipped() {
        let mut s = ConditionalStack::new();
        s.push_if(true).unwrap();
        assert!(!s.is_skipping());
        s.do_endif().unwrap();
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn false_branch_is_skipped_until_else() {
        let mut s = ConditionalStack::new();
        s.push_if(false).unwrap();
        assert!(s.is_skipping());
        s.do_else().unwrap();
        assert!(!s.is_skipping());
        s.do_endif().unwrap();
    }

    #[test]
    fn nested_conditional_respects_outer_skip() {
        let mut s = ConditionalStack::new();
        s.push_if(false).unwrap();
        s.push_if(true).unwrap();
        // Outer is false, so even though the inner condition is true the
        // inner frame must not become active.
        assert!(s.is_skipping());
        s.do_endif().unwrap();
        s.do_endif().unwrap();
    }

    #[test]
    fn depth_limit_enforced() {
        let mut s = ConditionalStack::new();
        for _ in 0..MAX_DEPTH {
            s.push_if(true).unwrap();
        }
        assert!(s.push_if(true).is_err());
    }

    #[test]
    fn unmatched_endif_errors() {
        let mut s = ConditionalStack::new();
        assert!(s.do_endif().is_err());
    }

    #[test]
    fn error_fires_only_on_pass_one_when_active() {
        let mut s = ConditionalStack::new();
        s.push_if(true).unwrap();
        assert!(s.should_fire_error(1));
        assert!(!s.should_fire_error(2));
    }

    #[test]
    fn error_does_not_fire_when_skipping() {
        let mut s = ConditionalStack::new();
        s.push_if(false).unwrap();
        assert!(!s.should_fire_error(1));
    }
}
