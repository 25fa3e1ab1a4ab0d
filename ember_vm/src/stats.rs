//! Machine statistics.

/// Counters the interpreter and scheduler update as they run.
#[derive(Debug, Default, Clone, Copy)]
pub struct MachineStats {
    /// Instructions executed.
    pub instructions: u64,
    /// Frames pushed.
    pub calls: u64,
    /// Values thrown (interpreted and internal).
    pub throws: u64,
    /// Tasks dispatched by the scheduler.
    pub tasks_dispatched: u64,
    /// Fibers created.
    pub fibers_spawned: u64,
    /// Worker threads started.
    pub workers_started: u64,
    /// Collections triggered from safepoints.
    pub gc_cycles: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zeroed() {
        let stats = MachineStats::default();
        assert_eq!(stats.instructions, 0);
        assert_eq!(stats.tasks_dispatched, 0);
    }
}
