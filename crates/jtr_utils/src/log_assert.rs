/// Checks an invariant that must hold, but whose violation is not worth failing a run over:
/// panics in debug builds, logs an error otherwise.
#[macro_export]
macro_rules! log_assert {
    ($check:expr, $($field:tt)*) => {{
        let check: bool = $check;
        debug_assert!(check);
        if !check {
            $crate::tracing::error!($($field)*)
        }
    }}
}

#[cfg(test)]
mod test {
    #[test]
    fn holding_check_is_silent() {
        let results = [1, 2];
        crate::log_assert!(results.len() == 2, count = results.len(), "results lost");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn failing_check_panics_in_debug_builds() {
        let reported = 1;
        crate::log_assert!(reported == 2, reported, "results lost");
    }
}
