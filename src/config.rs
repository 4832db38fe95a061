//! Configuration for the extractor, the renderer and the HTTP service.
//!
//! The extractor and renderer tables are plain values handed to the
//! components at construction so tests can swap them out. `ServiceConfig`
//! is read from the environment by the binary.

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::PathBuf;

pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_NOTION_API_KEY: &str = "NOTION_API_KEY";
pub const ENV_NOTION_DATABASE_ID: &str = "NOTION_DATABASE_ID";
pub const ENV_NOTION_API_BASE: &str = "NOTION_API_BASE";
pub const ENV_ARTICLE_INDEX_PATH: &str = "ARTICLE_INDEX_PATH";
pub const ENV_INSECURE_SSL: &str = "INSECURE_SSL";
pub const ENV_NOTION_TITLE_PROPERTY: &str = "NOTION_TITLE_PROPERTY";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com";
const DEFAULT_ARTICLE_INDEX_PATH: &str = "article-index.json";
const DEFAULT_TITLE_PROPERTY: &str = "Name";

/// Maximum characters in one rich-text field of a Notion block.
pub const MAX_BLOCK_TEXT_LENGTH: usize = 2000;
/// Maximum children accepted by one create/append call.
pub const MAX_BLOCKS_PER_REQUEST: usize = 100;

// ── Extractor tables ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Article container candidates, highest priority first.
    pub container_selectors: Vec<String>,
    pub title_selectors: Vec<String>,
    pub author_selectors: Vec<String>,
    /// Tags pruned together with their whole subtree.
    pub skip_tags: HashSet<String>,
    /// `data-testid` values marking non-content regions.
    pub skip_test_ids: HashSet<String>,
    /// Ancestors whose text the flat-text fallback ignores.
    pub fallback_skip_tags: HashSet<String>,
    pub fallback_min_fragment_chars: usize,
    pub fallback_min_total_chars: usize,
    pub fallback_max_chars: usize,
    pub min_paragraph_chars: usize,
    /// Lower-cased phrases that mean only a preview was served.
    pub paywall_indicators: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            container_selectors: strings(&[
                "article",
                "[data-testid='story-content']",
                ".postArticle-content",
                "main",
                "[role='main']",
            ]),
            title_selectors: strings(&[
                "article h1",
                "h1[data-testid='storyTitle']",
                ".graf--title",
                "h1",
            ]),
            author_selectors: strings(&[
                "[data-testid='authorName']",
                "a[rel='author']",
                ".pw-author-name",
            ]),
            skip_tags: string_set(&[
                "nav", "footer", "header", "button", "aside", "script", "style", "noscript",
                "iframe", "svg",
            ]),
            skip_test_ids: string_set(&[
                "headerNav",
                "postMetaLockup",
                "storyFooter",
                "publicationHeader",
            ]),
            fallback_skip_tags: string_set(&[
                "script", "style", "nav", "footer", "button", "noscript",
            ]),
            fallback_min_fragment_chars: 10,
            fallback_min_total_chars: 200,
            fallback_max_chars: 15_000,
            min_paragraph_chars: 5,
            paywall_indicators: strings(&[
                "member-only story",
                "this story is for members only",
                "become a member",
                "sign up to continue",
                "subscribe to read",
            ]),
        }
    }
}

// ── Renderer tables ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub max_block_text_length: usize,
    /// Code languages the destination accepts, lower-case.
    pub code_languages: HashSet<String>,
    pub language_aliases: HashMap<String, String>,
    pub default_language: String,
    /// Paragraph prefixes produced for figures, including translated forms.
    pub image_markers: Vec<String>,
    pub summary_heading: String,
    pub body_heading: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let aliases = [
            ("js", "javascript"),
            ("ts", "typescript"),
            ("py", "python"),
            ("rb", "ruby"),
            ("rs", "rust"),
            ("cpp", "c++"),
            ("sh", "shell"),
            ("yml", "yaml"),
            ("dockerfile", "docker"),
            ("objectivec", "objective-c"),
            ("objective c", "objective-c"),
            ("cplusplus", "c++"),
            ("csharp", "c#"),
            ("fsharp", "f#"),
            ("golang", "go"),
            ("tex", "latex"),
            ("text", "plain text"),
            ("txt", "plain text"),
            ("", "plain text"),
        ];

        Self {
            max_block_text_length: MAX_BLOCK_TEXT_LENGTH,
            code_languages: string_set(NOTION_CODE_LANGUAGES),
            language_aliases: aliases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            default_language: "plain text".to_string(),
            image_markers: strings(&["[Image:", "[画像:"]),
            summary_heading: "Summary".to_string(),
            body_heading: "Translation".to_string(),
        }
    }
}

const NOTION_CODE_LANGUAGES: &[&str] = &[
    "abap", "abc", "agda", "arduino", "ascii art", "assembly", "bash", "basic", "bnf", "c", "c#",
    "c++", "clojure", "coffeescript", "coq", "css", "dart", "dhall", "diff", "docker", "ebnf",
    "elixir", "elm", "erlang", "f#", "flow", "fortran", "gherkin", "glsl", "go", "graphql",
    "groovy", "haskell", "hcl", "html", "idris", "java", "javascript", "json", "julia", "kotlin",
    "latex", "less", "lisp", "livescript", "llvm ir", "lua", "makefile", "markdown", "markup",
    "matlab", "mathematica", "mermaid", "nix", "notion formula", "objective-c", "ocaml", "pascal",
    "perl", "php", "plain text", "powershell", "prolog", "protobuf", "purescript", "python", "r",
    "racket", "reason", "ruby", "rust", "sass", "scala", "scheme", "scss", "shell", "smalltalk",
    "solidity", "sql", "swift", "toml", "typescript", "vb.net", "verilog", "vhdl",
    "visual basic", "webassembly", "xml", "yaml", "java/c/c++/c#",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn string_set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ── Service configuration ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Credentials for the destination database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotionCredentials {
    api_key: String,
    database_id: String,
}

impl NotionCredentials {
    pub fn new(api_key: &str, database_id: &str) -> Result<Self, ConfigError> {
        let api_key = api_key.trim();
        if api_key.is_empty() || api_key.starts_with("ntn_your") {
            return Err(ConfigError::InvalidValue {
                field: ENV_NOTION_API_KEY,
                reason: "Notion API key is not set".to_string(),
            });
        }

        let database_id = database_id.trim();
        if database_id.is_empty() || database_id.starts_with("your_") {
            return Err(ConfigError::InvalidValue {
                field: ENV_NOTION_DATABASE_ID,
                reason: "Notion database id is not set".to_string(),
            });
        }

        Ok(Self {
            api_key: api_key.to_string(),
            database_id: database_id.replace('-', ""),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Database id in hyphenated UUID form, as the API expects it.
    pub fn database_id(&self) -> String {
        let d = &self.database_id;
        if d.len() == 32 && d.is_ascii() {
            format!(
                "{}-{}-{}-{}-{}",
                &d[..8],
                &d[8..12],
                &d[12..16],
                &d[16..20],
                &d[20..]
            )
        } else {
            d.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub notion: Option<NotionCredentials>,
    pub notion_api_base: String,
    /// Name of the database's title column.
    pub title_property: String,
    pub index_path: PathBuf,
    pub insecure_ssl: bool,
}

impl ServiceConfig {
    /// Load from environment variables. Publishing stays disabled when
    /// neither Notion variable is set; setting only one of them is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var(ENV_BIND_ADDR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let notion_api_base =
            env::var(ENV_NOTION_API_BASE).unwrap_or_else(|_| DEFAULT_NOTION_API_BASE.to_string());
        let index_path = env::var(ENV_ARTICLE_INDEX_PATH)
            .unwrap_or_else(|_| DEFAULT_ARTICLE_INDEX_PATH.to_string());
        let insecure_ssl = env::var(ENV_INSECURE_SSL).as_deref() == Ok("1");
        let title_property = env::var(ENV_NOTION_TITLE_PROPERTY)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE_PROPERTY.to_string());

        let notion = match (
            env::var(ENV_NOTION_API_KEY).ok(),
            env::var(ENV_NOTION_DATABASE_ID).ok(),
        ) {
            (None, None) => None,
            (key, db) => Some(NotionCredentials::new(
                key.as_deref().unwrap_or(""),
                db.as_deref().unwrap_or(""),
            )?),
        };

        Ok(Self {
            bind_addr,
            notion,
            notion_api_base: notion_api_base.trim_end_matches('/').to_string(),
            title_property,
            index_path: PathBuf::from(index_path),
            insecure_ssl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            ENV_BIND_ADDR,
            ENV_NOTION_API_KEY,
            ENV_NOTION_DATABASE_ID,
            ENV_NOTION_API_BASE,
            ENV_ARTICLE_INDEX_PATH,
            ENV_INSECURE_SSL,
            ENV_NOTION_TITLE_PROPERTY,
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_when_env_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let cfg = ServiceConfig::from_env().unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(cfg.notion_api_base, DEFAULT_NOTION_API_BASE);
        assert_eq!(cfg.index_path, PathBuf::from(DEFAULT_ARTICLE_INDEX_PATH));
        assert_eq!(cfg.title_property, "Name");
        assert!(cfg.notion.is_none());
        assert!(!cfg.insecure_ssl);
    }

    #[test]
    fn half_configured_notion_is_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var(ENV_NOTION_API_KEY, "secret_abc");
        let err = ServiceConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: ENV_NOTION_DATABASE_ID, .. }
        ));
        clear_env();
    }

    #[test]
    fn overrides_when_env_present() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var(ENV_BIND_ADDR, "127.0.0.1:9000");
        env::set_var(ENV_NOTION_API_KEY, "secret_abc");
        env::set_var(ENV_NOTION_DATABASE_ID, "2a354f2b-d9f0-80c6-ad76-f4c0caa22b65");
        env::set_var(ENV_NOTION_API_BASE, "http://localhost:1234/");
        env::set_var(ENV_INSECURE_SSL, "1");
        env::set_var(ENV_NOTION_TITLE_PROPERTY, "Title");
        let cfg = ServiceConfig::from_env().unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.notion_api_base, "http://localhost:1234");
        assert!(cfg.insecure_ssl);
        assert_eq!(cfg.title_property, "Title");
        let notion = cfg.notion.unwrap();
        assert_eq!(notion.api_key(), "secret_abc");
        assert_eq!(notion.database_id(), "2a354f2b-d9f0-80c6-ad76-f4c0caa22b65");
        clear_env();
    }

    #[test]
    fn placeholder_credentials_are_rejected() {
        assert!(NotionCredentials::new("ntn_your_key_here", "abc").is_err());
        assert!(NotionCredentials::new("secret", "your_database_id").is_err());
    }

    #[test]
    fn database_id_is_hyphenated() {
        let creds = NotionCredentials::new("secret", "2a354f2bd9f080c6ad76f4c0caa22b65").unwrap();
        assert_eq!(creds.database_id(), "2a354f2b-d9f0-80c6-ad76-f4c0caa22b65");
    }

    #[test]
    fn default_tables_are_consistent() {
        let cfg = RendererConfig::default();
        assert!(cfg.code_languages.contains(&cfg.default_language));
        for target in cfg.language_aliases.values() {
            assert!(cfg.code_languages.contains(target), "alias target {target}");
        }
    }
}
