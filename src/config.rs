use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

use crate::homepage;
use crate::provider::{self, Credentials, ProviderConfig, ProviderKind};

/// Everything a publishing run needs to know, read from environment-style
/// key/value pairs. Empty values count as unset.
#[derive(Clone, Debug)]
pub struct Config {
    /// The absolute site root without a trailing slash.
    pub site_url: String,
    pub site_name: String,

    /// The directory posts are written to.
    pub blog_dir: PathBuf,

    /// The blog listing page.
    pub blog_index: PathBuf,

    /// The homepage with the latest-posts markers. It may not exist.
    pub home_index: PathBuf,
    pub sitemap: PathBuf,

    /// The run log.
    pub memory_file: PathBuf,
    pub target_words: u32,
    pub home_latest_count: usize,

    pub provider: Option<ProviderKind>,
    pub openai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub model: Option<String>,
    pub provider_fallback: bool,

    /// Sent to OpenRouter as the referring site.
    pub public_site_url: String,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Config> {
        Config::from_vars(std::env::vars())
    }

    /// Reads the configuration from `vars`.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Config>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        let get = |key: &str| vars.get(key).map(|v| v.trim().to_owned());

        let site_url = parse_site_url(&get("SITE_URL").unwrap_or_else(|| String::from("https://example.com")))?;
        let blog_dir = PathBuf::from(get("BLOG_DIR").unwrap_or_else(|| String::from("blog")));

        Ok(Config {
            site_name: get("SITE_NAME").unwrap_or_else(|| String::from("Daybook")),
            blog_index: get("BLOG_INDEX")
                .map(PathBuf::from)
                .unwrap_or_else(|| blog_dir.join("index.html")),
            home_index: PathBuf::from(get("HOME_INDEX_PATH").unwrap_or_else(|| String::from("index.html"))),
            sitemap: PathBuf::from(get("SITEMAP_PATH").unwrap_or_else(|| String::from("sitemap.xml"))),
            memory_file: PathBuf::from(get("MEMORY_FILE").unwrap_or_else(|| String::from(".post_memory.json"))),
            target_words: parse_number("TARGET_WORDS", get("TARGET_WORDS"), 1000)?,
            home_latest_count: parse_number(
                "HOME_LATEST_COUNT",
                get("HOME_LATEST_COUNT"),
                homepage::DEFAULT_MAX_ITEMS,
            )?,
            provider: match get("PROVIDER") {
                Some(name) => Some(name.parse::<ProviderKind>().map_err(|e| anyhow!("Reading PROVIDER: {}", e))?),
                None => None,
            },
            openai_api_key: get("OPENAI_API_KEY"),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            model: get("OPENAI_MODEL"),
            provider_fallback: parse_bool("PROVIDER_FALLBACK", get("PROVIDER_FALLBACK"), true)?,
            public_site_url: get("PUBLIC_SITE_URL").unwrap_or_else(|| site_url.clone()),
            site_url,
            blog_dir,
        })
    }

    /// The providers to try, in order.
    pub fn providers(&self) -> Vec<ProviderConfig> {
        provider::chain(&Credentials {
            forced: self.provider,
            openai_key: self.openai_api_key.as_deref(),
            openrouter_key: self.openrouter_api_key.as_deref(),
            model: self.model.as_deref(),
            fallback: self.provider_fallback,
            referer: Some(&self.public_site_url),
            title: Some(&self.site_name),
        })
    }
}

fn parse_site_url(s: &str) -> Result<String> {
    let url = Url::parse(s).with_context(|| format!("Parsing SITE_URL '{}'", s))?;
    match url.scheme() {
        "http" | "https" => Ok(s.trim_end_matches('/').to_owned()),
        scheme => Err(anyhow!(
            "SITE_URL '{}' must be an http or https URL, not {}",
            s,
            scheme
        )),
    }
}

fn parse_number<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        None => Ok(default),
        Some(value) => value
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", key, value)),
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(anyhow!("{} must be true or false, got '{}'", key, other)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        Config::from_vars(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = config(&[])?;
        assert_eq!("https://example.com", config.site_url);
        assert_eq!("Daybook", config.site_name);
        assert_eq!(Path::new("blog"), config.blog_dir);
        assert_eq!(Path::new("blog/index.html"), config.blog_index);
        assert_eq!(Path::new("index.html"), config.home_index);
        assert_eq!(Path::new("sitemap.xml"), config.sitemap);
        assert_eq!(Path::new(".post_memory.json"), config.memory_file);
        assert_eq!(1000, config.target_words);
        assert_eq!(homepage::DEFAULT_MAX_ITEMS, config.home_latest_count);
        assert_eq!(None, config.provider);
        assert!(config.provider_fallback);
        assert_eq!("https://example.com", config.public_site_url);
        assert!(config.providers().is_empty());
        Ok(())
    }

    #[test]
    fn test_overrides() -> Result<()> {
        let config = config(&[
            ("SITE_URL", "https://blog.example.org/"),
            ("BLOG_DIR", "out/posts"),
            ("TARGET_WORDS", "1500"),
            ("HOME_LATEST_COUNT", "3"),
            ("PROVIDER", "OpenRouter"),
            ("OPENROUTER_API_KEY", "sk-r"),
            ("PROVIDER_FALLBACK", "no"),
            ("SITE_NAME", "  "),
        ])?;
        assert_eq!("https://blog.example.org", config.site_url);
        assert_eq!(Path::new("out/posts/index.html"), config.blog_index);
        assert_eq!(1500, config.target_words);
        assert_eq!(3, config.home_latest_count);
        assert_eq!(Some(ProviderKind::OpenRouter), config.provider);
        assert!(!config.provider_fallback);
        assert_eq!("Daybook", config.site_name);

        let providers = config.providers();
        assert_eq!(1, providers.len());
        assert_eq!(Some("https://blog.example.org"), providers[0].referer.as_deref());
        assert_eq!(Some("Daybook"), providers[0].title.as_deref());
        Ok(())
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("TARGET_WORDS", "lots")]).is_err());
        assert!(config(&[("HOME_LATEST_COUNT", "-1")]).is_err());
        assert!(config(&[("PROVIDER_FALLBACK", "maybe")]).is_err());
        assert!(config(&[("PROVIDER", "anthropic")]).is_err());
        assert!(config(&[("SITE_URL", "not a url")]).is_err());
        assert!(config(&[("SITE_URL", "ftp://example.com")]).is_err());
    }
}
