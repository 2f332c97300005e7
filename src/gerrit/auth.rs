//! Gerrit host and credential discovery.
//!
//! The Gerrit endpoint is derived from the repository's origin remote,
//! optionally overridden by the `gerrit` key in `codereview.cfg`.
//! Credentials come from git's `http.cookiefile` (where Gerrit setup
//! instructions put them) or, failing that, from `~/.netrc`. Discovery
//! runs once per process, when the client is constructed.

use crate::error::{Result, RevuError};
use crate::git;
use crate::session::Session;
use std::path::PathBuf;

/// Resolved Gerrit endpoint and credentials.
#[derive(Debug, Clone)]
pub struct GerritAuth {
    /// Cookie-matching host, like "go.googlesource.com".
    pub host: String,
    /// API base URL, like "https://go-review.googlesource.com".
    pub url: String,
    /// Project name on the server, like "tools".
    pub project: String,
    /// How requests authenticate.
    pub credential: Credential,
}

/// Authentication material for Gerrit requests.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Cookie name and value from git's cookie file.
    Cookie { name: String, value: String },
    /// Username and password from .netrc.
    Basic { user: String, password: String },
}

impl GerritAuth {
    /// Discover the Gerrit endpoint and credentials for this repository.
    pub fn discover(session: &Session) -> Result<Self> {
        let origin_cfg = session.config_value("gerrit").map(String::from);
        let out = git::run_git_unchecked(
            &session.repo_root,
            &["config", "remote.origin.url"],
        )?;
        if !out.success || out.stdout.is_empty() {
            return Err(RevuError::GerritError(
                "failed to load Gerrit origin: no remote.origin.url configured".to_string(),
            ));
        }
        let (host, url, project) = resolve_origin(origin_cfg.as_deref(), &out.stdout)?;
        let credential = load_credential(session, &host, &url)?;
        Ok(Self {
            host,
            url,
            project,
            credential,
        })
    }
}

/// Resolve (host, api-url, project) from the `gerrit` config value and
/// git's `remote.origin.url`.
///
/// `*.googlesource.com` origins get the `-review` API-host rewrite; the
/// cookie host stays the non-review name, because that is the name the
/// Gerrit setup instructions write a cookie for. Anything else must either
/// match the configured `gerrit` URL prefix (allowing sub-path hosting)
/// or is split into scheme://host and path=project directly.
pub fn resolve_origin(
    gerrit_cfg: Option<&str>,
    remote_origin: &str,
) -> Result<(String, String, String)> {
    let parsed = reqwest::Url::parse(remote_origin).map_err(|e| {
        RevuError::GerritError(format!(
            "failed to parse git's remote.origin.url {:?} as a URL: {}",
            remote_origin, e
        ))
    })?;
    // Strip embedded userinfo before using the URL as a string.
    let mut parsed = parsed;
    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    let remote_origin = parsed.as_str().trim_end_matches('/').to_string();

    let has_config = gerrit_cfg.is_some();
    let origin = gerrit_cfg
        .map(str::to_string)
        .unwrap_or_else(|| remote_origin.clone());

    if origin.contains("github.com") {
        return Err(RevuError::GerritError(format!(
            "git origin must be a Gerrit host, not GitHub: {}",
            origin
        )));
    }

    if let Some(gs) = origin.find(".googlesource.com") {
        if !origin.starts_with("https://") {
            return Err(RevuError::GerritError(format!(
                "git origin must be an https:// URL: {}",
                origin
            )));
        }
        // https:// prefix and then one slash between host and project name.
        if origin.matches('/').count() != 3 {
            return Err(RevuError::GerritError(format!(
                "git origin is malformed: {}",
                origin
            )));
        }
        let Some((prefix, project)) = origin.rsplit_once('/') else {
            return Err(RevuError::GerritError(format!(
                "git origin is malformed: {}",
                origin
            )));
        };
        let host = prefix["https://".len()..].to_string();
        let url = format!("{}-review{}", &prefix[..gs], &prefix[gs..]);
        return Ok((host, url, project.to_string()));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| {
            RevuError::GerritError(format!("git origin has no host: {}", remote_origin))
        })?
        .to_string();

    if has_config {
        if !remote_origin.starts_with(&origin) {
            return Err(RevuError::GerritError(format!(
                "Gerrit origin {:?} from codereview.cfg differs from git origin url {:?}",
                origin, remote_origin
            )));
        }
        let project = remote_origin[origin.len()..].trim_matches('/').to_string();
        Ok((host, origin, project))
    } else {
        let project = parsed.path().trim_matches('/').to_string();
        let url = remote_origin
            .strip_suffix(parsed.path().trim_end_matches('/'))
            .unwrap_or(&remote_origin)
            .trim_end_matches('/')
            .to_string();
        Ok((host, url, project))
    }
}

fn load_credential(session: &Session, host: &str, url: &str) -> Result<Credential> {
    // Git's http.cookiefile is where Gerrit now tells users to store
    // credentials.
    let out = git::run_git_unchecked(
        &session.repo_root,
        &["config", "--path", "--get-urlmatch", "http.cookiefile", url],
    )?;
    if out.success && !out.stdout.is_empty() {
        if let Ok(data) = std::fs::read_to_string(&out.stdout)
            && let Some((name, value)) = find_cookie(host, &data)
        {
            return Ok(Credential::Cookie { name, value });
        }
    }

    // Fall back to .netrc, where Gerrit used to tell users to store the
    // information.
    if let Some(path) = netrc_path()
        && let Ok(data) = std::fs::read_to_string(path)
        && let Some((user, password)) = parse_netrc(host, &data)
    {
        return Ok(Credential::Basic { user, password });
    }

    Err(RevuError::GerritError(format!(
        "cannot find authentication info for {}",
        host
    )))
}

fn netrc_path() -> Option<PathBuf> {
    // Git on Windows looks in $HOME\_netrc.
    let name = if cfg!(windows) { "_netrc" } else { ".netrc" };
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(PathBuf::from(home).join(name))
}

/// Find the cookie for `host` in a Netscape-format cookie file.
///
/// Domain entries starting with "." match any suffix of the host; the
/// longest matching domain wins.
pub fn find_cookie(host: &str, data: &str) -> Option<(String, String)> {
    let mut best: Option<(usize, String, String)> = None;
    for line in data.lines() {
        let f: Vec<&str> = line.split('\t').collect();
        if f.len() < 7 {
            continue;
        }
        let domain = f[0];
        let matches =
            domain == host || (domain.starts_with('.') && host.ends_with(domain));
        if matches && best.as_ref().is_none_or(|(len, _, _)| domain.len() > *len) {
            best = Some((domain.len(), f[5].to_string(), f[6].to_string()));
        }
    }
    best.map(|(_, name, value)| (name, value))
}

/// Find the login/password pair for `host` in .netrc content.
pub fn parse_netrc(host: &str, data: &str) -> Option<(String, String)> {
    for line in data.lines() {
        let line = line.split('#').next().unwrap_or("");
        let f: Vec<&str> = line.split_whitespace().collect();
        if f.len() >= 6
            && f[0] == "machine"
            && f[1] == host
            && f[2] == "login"
            && f[4] == "password"
        {
            return Some((f[3].to_string(), f[5].to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn googlesource_origin_gets_review_rewrite() {
        let (host, url, project) =
            resolve_origin(None, "https://go.googlesource.com/tools").unwrap();
        assert_eq!(host, "go.googlesource.com");
        assert_eq!(url, "https://go-review.googlesource.com");
        assert_eq!(project, "tools");
    }

    #[test]
    fn googlesource_origin_strips_userinfo() {
        let (host, url, project) =
            resolve_origin(None, "https://user@go.googlesource.com/crypto").unwrap();
        assert_eq!(host, "go.googlesource.com");
        assert_eq!(url, "https://go-review.googlesource.com");
        assert_eq!(project, "crypto");
    }

    #[test]
    fn github_origin_is_rejected() {
        let err = resolve_origin(None, "https://github.com/example/repo").unwrap_err();
        assert!(err.to_string().contains("not GitHub"));
    }

    #[test]
    fn config_override_allows_subpath_hosting() {
        let (host, url, project) = resolve_origin(
            Some("https://example.com/gerrit"),
            "https://example.com/gerrit/my/project",
        )
        .unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(url, "https://example.com/gerrit");
        assert_eq!(project, "my/project");
    }

    #[test]
    fn config_override_must_match_origin() {
        let err = resolve_origin(
            Some("https://review.example.com"),
            "https://other.example.com/project",
        )
        .unwrap_err();
        assert!(err.to_string().contains("differs from git origin"));
    }

    #[test]
    fn plain_https_origin_splits_host_and_project() {
        let (host, url, project) =
            resolve_origin(None, "https://gerrit.example.org/my-project").unwrap();
        assert_eq!(host, "gerrit.example.org");
        assert_eq!(url, "https://gerrit.example.org");
        assert_eq!(project, "my-project");
    }

    #[test]
    fn cookie_longest_domain_match_wins() {
        let data = concat!(
            ".googlesource.com\tTRUE\t/\tTRUE\t0\to1\tv-generic\n",
            "go.googlesource.com\tTRUE\t/\tTRUE\t0\to2\tv-exact\n",
        );
        let (name, value) = find_cookie("go.googlesource.com", data).unwrap();
        assert_eq!(name, "o2");
        assert_eq!(value, "v-exact");
    }

    #[test]
    fn cookie_suffix_domains_match() {
        let data = ".googlesource.com\tTRUE\t/\tTRUE\t0\tcookie\tvalue\n";
        assert!(find_cookie("go.googlesource.com", data).is_some());
        assert!(find_cookie("example.com", data).is_none());
    }

    #[test]
    fn netrc_finds_matching_machine() {
        let data = concat!(
            "machine other.com login a password b\n",
            "machine go.googlesource.com login alice password s3cret # comment\n",
        );
        let (user, password) = parse_netrc("go.googlesource.com", data).unwrap();
        assert_eq!(user, "alice");
        assert_eq!(password, "s3cret");
    }

    #[test]
    fn netrc_ignores_commented_lines() {
        let data = "# machine go.googlesource.com login a password b\n";
        assert!(parse_netrc("go.googlesource.com", data).is_none());
    }
}
