//! Allocates URL slugs for new posts. Allocation is a pure function of the
//! candidate text and a snapshot of the slugs already taken; the caller takes
//! the snapshot once per run.

use std::collections::HashSet;

/// Used when a candidate has no characters that survive normalization.
const FALLBACK_SLUG: &str = "post";

/// Normalizes `candidate` into a lowercase, hyphen-separated, URL-safe token.
/// Diacritics are transliterated, runs of anything non-alphanumeric collapse
/// into a single hyphen, and leading/trailing hyphens are trimmed.
pub fn normalize(candidate: &str) -> String {
    let slug = ::slug::slugify(candidate);
    match slug.is_empty() {
        true => FALLBACK_SLUG.to_owned(),
        false => slug,
    }
}

/// Returns the normalized `candidate` if it isn't in `existing`, otherwise the
/// first of `{slug}-2`, `{slug}-3`, ... that isn't.
pub fn allocate(candidate: &str, existing: &HashSet<String>) -> String {
    let base = normalize(candidate);
    if !existing.contains(&base) {
        return base;
    }

    let mut n: usize = 2;
    loop {
        let slug = format!("{}-{}", base, n);
        if !existing.contains(&slug) {
            return slug;
        }
        n += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!("redis-caching", normalize("Redis Caching"));
        assert_eq!("cafe-deja-vu", normalize("  Café -- Déjà vu!! "));
        assert_eq!("rust-grpc-microservices", normalize("Rust + gRPC: microservices"));
    }

    #[test]
    fn test_normalize_nothing_left() {
        assert_eq!(FALLBACK_SLUG, normalize("?!--"));
    }

    #[test]
    fn test_allocate_free_slug() {
        let existing = HashSet::new();
        assert_eq!("redis-caching", allocate("Redis caching", &existing));
    }

    #[test]
    fn test_allocate_first_come_sequence() {
        let mut existing = HashSet::new();
        let mut allocated = Vec::new();
        for _ in 0..5 {
            let slug = allocate("redis-caching", &existing);
            existing.insert(slug.clone());
            allocated.push(slug);
        }
        assert_eq!(
            vec![
                "redis-caching",
                "redis-caching-2",
                "redis-caching-3",
                "redis-caching-4",
                "redis-caching-5",
            ],
            allocated
        );
    }

    #[test]
    fn test_allocate_fills_gaps() {
        let existing: HashSet<String> = ["redis-caching", "redis-caching-2", "redis-caching-4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!("redis-caching-3", allocate("Redis Caching", &existing));
    }
}
