/// Asserts that two vectors agree component-wise within `tol`.
#[macro_export]
macro_rules! assert_vec_close {
    ($a:expr, $b:expr, $tol:expr) => {
        let (a, b) = ($a, $b);
        assert!(
            (a.x - b.x).abs() <= $tol && (a.y - b.y).abs() <= $tol,
            "{:?} and {:?} differ by more than {}",
            a,
            b,
            $tol
        );
    };
}

/// Asserts that no agent-agent contact was reported in any of the given step reports.
#[macro_export]
macro_rules! assert_no_agent_contacts {
    ($reports:expr) => {
        for report in $reports.iter() {
            assert_eq!(
                report.agent_collisions(),
                0,
                "Agent contact at step {}: {:?}",
                report.step,
                report.collisions
            );
        }
    };
}
