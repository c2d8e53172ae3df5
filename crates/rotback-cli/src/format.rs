use chrono::NaiveDateTime;

pub(crate) fn format_time(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `1 entry`, `3 entries`.
pub(crate) fn count_noun(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_time_is_human_readable() {
        let t = chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(2, 3, 4)
            .unwrap();
        assert_eq!(format_time(t), "2026-03-01 02:03:04");
    }

    #[test]
    fn count_noun_picks_form() {
        assert_eq!(count_noun(1, "entry", "entries"), "1 entry");
        assert_eq!(count_noun(0, "entry", "entries"), "0 entries");
        assert_eq!(count_noun(2, "lock", "locks"), "2 locks");
    }
}
