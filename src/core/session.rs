// This module provides arena-based session management for the TNT backend using bumpalo.
// CodegenSession owns a reference to the arena that interns every symbol name seen by the
// textual IR parser and the pipeline, so symbolic operands and fixups can hold plain
// &'arena str handles for the whole compilation without reference counting. The session also
// accumulates SessionStats across functions: functions compiled, instructions and bytes
// encoded, fixups recorded, branches expanded to their long form and relaxation iterations.
// Statistics are kept behind a RefCell so passes can record them through a shared reference.

//! Arena-based code generation session.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Code generation session.
///
/// All interned strings share the arena lifetime.
pub struct CodegenSession<'arena> {
    /// Arena allocator for session objects.
    arena: &'arena Bump,

    /// Aggregated statistics.
    stats: RefCell<SessionStats>,

    /// String interning for symbol names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CodegenSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned: &'arena str = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    pub fn record_function(&self, instructions: usize, bytes: usize, fixups: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;
        stats.instructions_encoded += instructions;
        stats.bytes_emitted += bytes;
        stats.fixups_recorded += fixups;
    }

    pub fn record_relaxation(&self, expanded: usize, iterations: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.branches_expanded += expanded;
        stats.relaxation_iterations += iterations;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Session statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub functions_compiled: usize,
    pub instructions_encoded: usize,
    pub bytes_emitted: usize,
    pub fixups_recorded: usize,
    /// Number of branches expanded to long format.
    pub branches_expanded: usize,
    pub relaxation_iterations: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Code generation statistics:")?;
        writeln!(f, "  Functions compiled:    {}", self.functions_compiled)?;
        writeln!(f, "  Instructions encoded:  {}", self.instructions_encoded)?;
        writeln!(f, "  Bytes emitted:         {}", self.bytes_emitted)?;
        writeln!(f, "  Fixups recorded:       {}", self.fixups_recorded)?;
        writeln!(f, "  Branches expanded:     {}", self.branches_expanded)?;
        write!(f, "  Relaxation iterations: {}", self.relaxation_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CodegenSession::new(&arena);

        let a = session.intern_str("memcpy");
        let b = session.intern_str("memcpy");
        let c = session.intern_str("memset");

        assert!(std::ptr::eq(a, b));
        assert_ne!(a, c);
    }

    #[test]
    fn test_stats_accumulate() {
        let arena = Bump::new();
        let session = CodegenSession::new(&arena);

        session.record_function(10, 80, 2);
        session.record_function(4, 32, 0);
        session.record_relaxation(3, 2);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 2);
        assert_eq!(stats.instructions_encoded, 14);
        assert_eq!(stats.bytes_emitted, 112);
        assert_eq!(stats.fixups_recorded, 2);
        assert_eq!(stats.branches_expanded, 3);
        assert_eq!(stats.relaxation_iterations, 2);
    }
}
