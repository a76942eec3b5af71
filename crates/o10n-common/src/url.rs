//! URL resolution utilities.
//!
//! Stylesheet URLs arrive in every shape a template can produce: absolute,
//! protocol-relative, root-relative and document-relative. These helpers
//! normalize them against the [`Site`] being optimized.

use std::path::PathBuf;

/// Resolve a potentially relative URL against a base URL.
///
/// # Algorithm
///
/// STEP 1: If `href` is absolute (has a scheme), return it unchanged.
///
/// STEP 2: If `href` is protocol-relative, borrow the scheme of `base_url`.
///
/// STEP 3: If `href` is root-relative, join it with the origin of `base_url`.
///
/// STEP 4: Otherwise join it with the directory of `base_url` and collapse
/// `.` and `..` segments.
#[must_use]
pub fn resolve_url(href: &str, base_url: Option<&str>) -> String {
    // STEP 1: Absolute URLs (including data: URIs) are final.
    if is_absolute(href) {
        return href.to_string();
    }

    let Some(base) = base_url else {
        return href.to_string();
    };

    // STEP 2: Protocol-relative URL.
    if href.starts_with("//") {
        return match base.find("://") {
            Some(end) => format!("{}:{href}", &base[..end]),
            None => href.to_string(),
        };
    }

    // STEP 3: Root-relative URL.
    let (origin, base_path) = split_origin(base).unwrap_or(("", base));
    if href.starts_with('/') {
        return format!("{origin}{}", normalize_path(href));
    }

    // STEP 4: Document-relative URL.
    let (href_path, suffix) = split_suffix(href);
    let base_dir = base_path
        .rsplit_once('/')
        .map_or("", |(dir, _)| dir);
    format!(
        "{origin}{}{suffix}",
        normalize_path(&format!("{base_dir}/{href_path}"))
    )
}

/// True when `href` carries a URL scheme (`https:`, `data:`, ...).
#[must_use]
pub fn is_absolute(href: &str) -> bool {
    let Some(colon) = href.find(':') else {
        return false;
    };
    let scheme = &href[..colon];
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// True for URLs that can be downloaded over HTTP.
#[must_use]
pub fn valid_protocol(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//")
}

/// Split `scheme://host/path` (or `//host/path`) into origin and path.
///
/// Returns `None` for URLs without an authority component.
#[must_use]
pub fn split_origin(url: &str) -> Option<(&str, &str)> {
    let authority_start = if url.starts_with("//") {
        2
    } else {
        url.find("://")? + 3
    };
    let path_start = url[authority_start..]
        .find(['/', '?', '#'])
        .map_or(url.len(), |i| authority_start + i);
    Some((&url[..path_start], &url[path_start..]))
}

/// Strip scheme and host, leaving the root-relative path (with query).
#[must_use]
pub fn remove_host(url: &str) -> String {
    match split_origin(url) {
        Some((_, "")) => "/".to_string(),
        Some((_, path)) => path.to_string(),
        None => url.to_string(),
    }
}

/// Drop the query string and fragment.
#[must_use]
pub fn strip_query(url: &str) -> &str {
    url.find(['?', '#']).map_or(url, |i| &url[..i])
}

/// Last path segment of a URL, without query string.
#[must_use]
pub fn filename(url: &str) -> &str {
    let path = strip_query(url);
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Collapse `.` and `..` segments of an absolute path.
///
/// `..` never climbs above the root.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let (path, suffix) = split_suffix(path);
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                let _ = segments.pop();
            }
            other => segments.push(other),
        }
    }
    let trailing = if path.ends_with('/') && !segments.is_empty() {
        "/"
    } else {
        ""
    };
    format!("/{}{trailing}{suffix}", segments.join("/"))
}

fn split_suffix(href: &str) -> (&str, &str) {
    href.find(['?', '#'])
        .map_or((href, ""), |i| (&href[..i], &href[i..]))
}

fn host_of(origin: &str) -> &str {
    origin
        .find("//")
        .map_or(origin, |i| &origin[i + 2..])
}

/// The website being optimized: its public URL and the directory it is
/// served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    url: String,
    document_root: PathBuf,
}

impl Site {
    /// Create a site from its public URL (e.g. `https://example.com/blog`)
    /// and the filesystem directory that URL maps to.
    #[must_use]
    pub fn new(url: &str, document_root: impl Into<PathBuf>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            document_root: document_root.into(),
        }
    }

    /// Public site URL without trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// True when the site is served over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.url.starts_with("https://")
    }

    /// Root-relative path of the site, always ending in `/`.
    #[must_use]
    pub fn root_path(&self) -> String {
        let path = split_origin(&self.url).map_or("", |(_, path)| path);
        format!("{}/", path.trim_end_matches('/'))
    }

    /// Give protocol-relative URLs the scheme of the site.
    #[must_use]
    pub fn translate_protocol(&self, href: &str) -> String {
        if href.starts_with("//") {
            let scheme = if self.is_secure() { "https" } else { "http" };
            format!("{scheme}:{href}")
        } else {
            href.to_string()
        }
    }

    /// True when `href` points at this site (root-relative, document
    /// relative, or absolute with the same host).
    #[must_use]
    pub fn is_same_host(&self, href: &str) -> bool {
        match split_origin(href) {
            Some((origin, _)) => split_origin(&self.url)
                .is_some_and(|(site, _)| host_of(site).eq_ignore_ascii_case(host_of(origin))),
            None => !is_absolute(href),
        }
    }

    /// Map a stylesheet URL to a file under the document root.
    ///
    /// Returns `None` for foreign hosts, for paths outside the site root
    /// and for files that do not exist.
    #[must_use]
    pub fn local_path(&self, href: &str) -> Option<PathBuf> {
        if !self.is_same_host(href) {
            return None;
        }
        let href = strip_query(href);
        let root = self.root_path();
        let path = match split_origin(href) {
            Some((_, path)) => normalize_path(path),
            None if href.starts_with('/') => normalize_path(href),
            None => normalize_path(&format!("{root}{href}")),
        };
        let relative = path.strip_prefix(&root)?;
        if relative.is_empty() {
            return None;
        }
        let candidate = self.document_root.join(relative);
        candidate.is_file().then_some(candidate)
    }
}

/// CDN host rewrite for local asset URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnRewrite {
    /// CDN base URL (e.g. `https://cdn.example.net`).
    pub url: String,
    /// Optional path prefix that the CDN maps to its root.
    pub mask: Option<String>,
}

impl CdnRewrite {
    /// Rewrite `url` onto the CDN when it belongs to `site`.
    ///
    /// Foreign URLs, and local URLs outside the mask, are returned unchanged.
    #[must_use]
    pub fn apply(&self, site: &Site, url: &str) -> String {
        if !site.is_same_host(url) || !(url.starts_with('/') || split_origin(url).is_some()) {
            return url.to_string();
        }
        let path = remove_host(url);
        let path = match self.mask.as_deref().map(|m| m.trim_end_matches('/')) {
            Some(mask) if !mask.is_empty() => match path.strip_prefix(mask) {
                Some(rest) if rest.starts_with('/') => rest.to_string(),
                _ => return url.to_string(),
            },
            _ => path,
        };
        format!("{}{path}", self.url.trim_end_matches('/'))
    }
}
