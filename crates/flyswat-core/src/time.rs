/// Milliseconds since the Unix epoch; used as the leaderboard insertion
/// timestamp.
pub fn timestamp_millis() -> u64 {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_after_2024() {
        // 2024-01-01T00:00:00Z
        assert!(timestamp_millis() > 1_704_067_200_000);
    }
}
