//! Structured run-event logging for the recipe engine and controller.
//!
//! A pipeline that aborts at 3 AM needs its failure context recoverable from
//! the log alone. The `run_event!` macro emits one key-value event line per
//! call through the standard `log` facade, so the sink (console or the
//! configured `log_path` file) is chosen once by the controller.

/// Logs a structured key-value event line at the given `log` level.
///
/// # Example
/// ```
/// use echelle_drp::run_event;
/// let step = 2;
/// run_event!(info, "event" = "step_succeeded", "step" = &step, "primitive" = "divide_flat");
/// ```
#[macro_export]
macro_rules! run_event {
    ($level:ident, $($key:literal = $value:expr),+ $(,)?) => {
        {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            log::$level!("DRP_EVENT: {{ {} }}", parts.join(", "));
        }
    };
}
