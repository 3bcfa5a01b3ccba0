//! Chooses the day's topic. The choice is a pure function of the publishing
//! date, so a re-run on the same day asks for the same topic.

use chrono::{Datelike, NaiveDate};

const BUCKETS: &[&str] = &[
    "AI agents & tool-use patterns",
    "Next.js performance tips",
    "NestJS + DynamoDB patterns",
    "Rust + gRPC microservices",
    "GraphQL production recipes",
    "PostgreSQL tuning for SaaS",
];

const ANGLES: &[&str] = &[
    "from-scratch guide",
    "production checklist",
    "pitfalls and fixes",
    "architecture patterns",
    "hands-on tutorial",
];

const BANNED_KEYWORDS: &[&str] = &["casino", "adult", "hate", "piracy"];

/// Used whenever the chosen topic contains a banned keyword.
pub const FALLBACK_TOPIC: &str = "AI agents & tool-use patterns: hands-on tutorial";

/// The topic chosen for a day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// The topic drawn from the buckets and angles.
    pub drawn: String,

    /// The topic to write about: `drawn`, or [`FALLBACK_TOPIC`] if `drawn`
    /// was blocked.
    pub topic: String,
}

impl Selection {
    pub fn substituted(&self) -> bool {
        self.drawn != self.topic
    }
}

/// Draws `"{bucket}: {angle}"` topics and screens them against banned
/// keywords.
#[derive(Clone, Debug)]
pub struct TopicPicker {
    pub buckets: Vec<String>,
    pub angles: Vec<String>,
    pub banned: Vec<String>,
    pub fallback: String,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for TopicPicker {
    fn default() -> TopicPicker {
        TopicPicker {
            buckets: owned(BUCKETS),
            angles: owned(ANGLES),
            banned: owned(BANNED_KEYWORDS),
            fallback: FALLBACK_TOPIC.to_owned(),
        }
    }
}

impl TopicPicker {
    /// Whether `topic` contains a banned keyword, ignoring case.
    pub fn is_blocked(&self, topic: &str) -> bool {
        let topic = topic.to_lowercase();
        self.banned
            .iter()
            .any(|keyword| topic.contains(&keyword.to_lowercase()))
    }

    /// Draws the topic for `day` without screening it.
    pub fn draw(&self, day: NaiveDate) -> String {
        let mut rng = SplitMix64(day.num_days_from_ce() as u64);
        let bucket = pick(&self.buckets, &mut rng);
        let angle = pick(&self.angles, &mut rng);
        match (bucket, angle) {
            (Some(bucket), Some(angle)) => format!("{}: {}", bucket, angle),
            (Some(only), None) | (None, Some(only)) => only.to_owned(),
            (None, None) => self.fallback.clone(),
        }
    }

    /// Draws the topic for `day`, substituting the fallback if it's blocked.
    pub fn select(&self, day: NaiveDate) -> Selection {
        let drawn = self.draw(day);
        let topic = match self.is_blocked(&drawn) {
            true => self.fallback.clone(),
            false => drawn.clone(),
        };
        Selection { drawn, topic }
    }
}

fn pick<'a>(items: &'a [String], rng: &mut SplitMix64) -> Option<&'a str> {
    match items.len() {
        0 => None,
        len => Some(items[(rng.next() % len as u64) as usize].as_str()),
    }
}

/// The SplitMix64 generator. Output depends only on the seed.
struct SplitMix64(u64);

impl SplitMix64 {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_draw_is_deterministic_per_day() {
        let picker = TopicPicker::default();
        let today = day(2024, 6, 1);
        assert_eq!(picker.draw(today), picker.draw(today));

        let topic = picker.draw(today);
        let (bucket, angle) = topic.split_once(": ").unwrap();
        assert!(BUCKETS.contains(&bucket));
        assert!(ANGLES.contains(&angle));
    }

    #[test]
    fn test_draw_varies_across_days() {
        let picker = TopicPicker::default();
        let topics: std::collections::HashSet<String> = (1..=28)
            .map(|d| picker.draw(day(2024, 2, d)))
            .collect();
        assert!(topics.len() > 1);
    }

    #[test]
    fn test_is_blocked_ignores_case() {
        let picker = TopicPicker::default();
        assert!(picker.is_blocked("Online CASINO scaling"));
        assert!(picker.is_blocked("whatever: Adult content"));
        assert!(!picker.is_blocked("Rust + gRPC microservices: hands-on tutorial"));
    }

    #[test]
    fn test_blocked_topic_is_substituted() {
        let picker = TopicPicker {
            buckets: vec![String::from("Casino payment systems")],
            ..TopicPicker::default()
        };
        let selection = picker.select(day(2024, 6, 1));
        assert!(selection.drawn.starts_with("Casino payment systems: "));
        assert_eq!(FALLBACK_TOPIC, selection.topic);
        assert!(selection.substituted());
    }

    #[test]
    fn test_default_topics_are_not_blocked() {
        let picker = TopicPicker::default();
        for d in 1..=31 {
            let selection = picker.select(day(2024, 1, d));
            assert!(!selection.substituted());
            assert_eq!(selection.drawn, selection.topic);
        }
        assert!(!picker.is_blocked(FALLBACK_TOPIC));
    }

    #[test]
    fn test_empty_lists_fall_back() {
        let picker = TopicPicker {
            buckets: Vec::new(),
            angles: Vec::new(),
            ..TopicPicker::default()
        };
        assert_eq!(FALLBACK_TOPIC, picker.draw(day(2024, 6, 1)));
    }
}
