/// Human-readable preparation time: "0 mins", "45 mins", "1h", "1h 30m".
pub fn format_prep_time(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{} mins", minutes);
    }
    let (hours, rest) = (minutes / 60, minutes % 60);
    if rest == 0 {
        format!("{}h", hours)
    } else {
        format!("{}h {}m", hours, rest)
    }
}
