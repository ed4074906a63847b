use std::time::Duration;

/// Format a duration as `h:mm:ss.mmm`
pub fn format_elapsed(elapsed: Duration) -> String {
    let Ok(elapsed) = chrono::Duration::from_std(elapsed) else {
        return format!("{:?}", elapsed);
    };
    let hours = elapsed.num_hours();
    let minutes = elapsed.num_minutes() % 60;
    let seconds = elapsed.num_seconds() % 60;
    let millis = elapsed.num_milliseconds() % 1000;
    format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}
