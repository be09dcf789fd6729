use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{RepographError, Result};

/// Owner and name of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    /// Canonical browser URL for the repository
    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Parses full repository URLs and `owner/repo` shorthand
pub struct RepoUrlParser {
    url_regex: Regex,
    shorthand_regex: Regex,
    name_regex: Regex,
    trailing_slashes: Regex,
    query_or_fragment: Regex,
}

impl RepoUrlParser {
    pub fn new() -> Self {
        Self {
            url_regex: Regex::new(r"(?i)^(?:https?://)?github\.com/([^/]+)/([^/]+)/?$")
                .expect("Invalid repository URL regex"),
            shorthand_regex: Regex::new(r"^([^/]+)/([^/]+)$")
                .expect("Invalid shorthand regex"),
            name_regex: Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._-]*[a-zA-Z0-9])?$")
                .expect("Invalid name regex"),
            trailing_slashes: Regex::new(r"/+$").expect("Invalid trailing slash regex"),
            query_or_fragment: Regex::new(r"[?#].*$").expect("Invalid query regex"),
        }
    }

    pub fn parse(&self, input: &str) -> Result<RepoRef> {
        let cleaned = input.trim();
        if cleaned.is_empty() {
            return Err(RepographError::InvalidInput(
                "Repository URL is required".to_string(),
            ));
        }

        let cleaned = self.trailing_slashes.replace(cleaned, "");
        let cleaned = self.query_or_fragment.replace(&cleaned, "");
        let cleaned = cleaned.strip_suffix(".git").unwrap_or(&*cleaned);

        if let Some(caps) = self.url_regex.captures(cleaned) {
            return self.validate(&caps[1], &caps[2]);
        }

        if let Some(caps) = self.shorthand_regex.captures(cleaned) {
            let owner = &caps[1];
            // `my-org.io/repo` reads like a domain, not an owner
            if owner.contains(':') || owner.contains('.') {
                return Err(RepographError::InvalidInput(format!(
                    "Invalid repository format: \"{}\". Expected \"owner/repo\" or a GitHub URL.",
                    input
                )));
            }
            return self.validate(owner, &caps[2]);
        }

        Err(RepographError::InvalidInput(format!(
            "Could not parse repository URL: \"{}\". Accepted formats: \
             \"https://github.com/owner/repo\", \"github.com/owner/repo\", or \"owner/repo\".",
            input
        )))
    }

    fn validate(&self, owner: &str, repo: &str) -> Result<RepoRef> {
        if !self.name_regex.is_match(owner) {
            return Err(RepographError::InvalidInput(format!(
                "Invalid GitHub owner: \"{}\".",
                owner
            )));
        }
        if !self.name_regex.is_match(repo) {
            return Err(RepographError::InvalidInput(format!(
                "Invalid GitHub repository name: \"{}\".",
                repo
            )));
        }

        Ok(RepoRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl Default for RepoUrlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a repository identifier with a shared parser instance
pub fn parse_repo_url(input: &str) -> Result<RepoRef> {
    static PARSER: OnceLock<RepoUrlParser> = OnceLock::new();
    PARSER.get_or_init(RepoUrlParser::new).parse(input)
}
