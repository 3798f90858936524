pub fn format_time(value: f64) -> String {
    format!("{value:.6}")
}

pub fn delay_millis(seconds: f64) -> u64 {
    (seconds * 1000.0).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_round_to_whole_milliseconds() {
        assert_eq!(delay_millis(3.2), 3200);
        assert_eq!(delay_millis(8.2004), 8200);
        assert_eq!(delay_millis(-1.0), 0);
    }
}
