//! Media type negotiation.
//!
//! A `format` query parameter names the representation directly and wins over
//! everything else. Otherwise the `Accept` header is ordered by quality and
//! the first entry the resource can produce is chosen. Partial wildcards such
//! as `text/*` are not resolved; only a literal `*/*` falls back to the
//! resource's preferred type.

use crate::error::ApiError;

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_HTML: &str = "text/html";
const ANY: &str = "*/*";

/// The resources that negotiate a representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Record,
    Project,
    ProjectList,
    PermissionList,
}

/// Serialization version of a vendor representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    V3,
    V4,
}

/// A representation the server can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Json,
    Html,
    Vendor(Resource, Version),
}

impl Resource {
    fn slug(self) -> &'static str {
        match self {
            Resource::Record => "record",
            Resource::Project => "project",
            Resource::ProjectList => "project-list",
            Resource::PermissionList => "permission-list",
        }
    }

    /// Type produced when the client expresses no usable preference
    pub fn preferred(self) -> MediaType {
        match self {
            Resource::PermissionList => MediaType::Json,
            other => MediaType::Vendor(other, Version::V4),
        }
    }
}

impl MediaType {
    /// Full MIME string, `product` being the vendor segment (`sumatra`)
    pub fn mime(&self, product: &str) -> String {
        match self {
            MediaType::Json => APPLICATION_JSON.to_string(),
            MediaType::Html => TEXT_HTML.to_string(),
            MediaType::Vendor(resource, version) => {
                let v = match version {
                    Version::V3 => 3,
                    Version::V4 => 4,
                };
                format!("application/vnd.{}.{}-v{}+json", product, resource.slug(), v)
            }
        }
    }

    /// Value for the `Content-Type` header
    pub fn content_type(&self, product: &str) -> String {
        format!("{}; charset=utf-8", self.mime(product))
    }

    /// JSON shape version; plain JSON uses the newest shape
    pub fn version(&self) -> Version {
        match self {
            MediaType::Vendor(_, version) => *version,
            _ => Version::V4,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, MediaType::Html)
    }

    fn from_abbreviation(abbr: &str) -> Option<MediaType> {
        let vendor = |resource, version| Some(MediaType::Vendor(resource, version));
        match abbr {
            "html" => Some(MediaType::Html),
            "json" => Some(MediaType::Json),
            "record-v3+json" => vendor(Resource::Record, Version::V3),
            "project-v3+json" => vendor(Resource::Project, Version::V3),
            "project-list-v3+json" => vendor(Resource::ProjectList, Version::V3),
            "record-v4+json" => vendor(Resource::Record, Version::V4),
            "project-v4+json" => vendor(Resource::Project, Version::V4),
            "project-list-v4+json" => vendor(Resource::ProjectList, Version::V4),
            _ => None,
        }
    }
}

/// Ordered preference list from an `Accept` header.
///
/// Entries are sorted by descending `q` (default 1.0, unparseable 0.0); equal
/// qualities keep their original order. Parameters other than `q` are dropped.
pub fn parse_accept_header(header: &str) -> Vec<String> {
    let mut entries: Vec<(f32, String)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let media_type = parts.next()?.trim();
            if media_type.is_empty() {
                return None;
            }
            let mut quality = 1.0;
            for param in parts {
                if let Some((name, value)) = param.split_once('=') {
                    if name.trim().eq_ignore_ascii_case("q") {
                        quality = value.trim().parse::<f32>().unwrap_or(0.0);
                    }
                }
            }
            Some((quality, media_type.to_ascii_lowercase()))
        })
        .collect();

    // sort_by is stable
    entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    entries.into_iter().map(|(_, mt)| mt).collect()
}

/// Choose the representation for one request
pub fn negotiate(
    resource: Resource,
    format: Option<&str>,
    accept: Option<&str>,
    product: &str,
) -> Result<MediaType, ApiError> {
    if let Some(abbr) = format {
        return MediaType::from_abbreviation(abbr).ok_or_else(|| {
            tracing::debug!("Unknown format abbreviation '{}'", abbr);
            ApiError::not_acceptable(format!("Unknown format '{}'", abbr))
        });
    }

    let preferred = resource.preferred();
    let accepted = match accept {
        Some(header) if !header.trim().is_empty() => parse_accept_header(header),
        _ => return Ok(preferred),
    };

    let preferred_mime = preferred.mime(product);
    for mt in &accepted {
        if *mt == preferred_mime {
            return Ok(preferred);
        }
        if mt == APPLICATION_JSON {
            return Ok(MediaType::Json);
        }
        if mt == TEXT_HTML {
            return Ok(MediaType::Html);
        }
    }
    if accepted.iter().any(|mt| mt == ANY) {
        return Ok(preferred);
    }

    tracing::debug!("No acceptable representation of {:?} in {:?}", resource, accepted);
    Err(ApiError::not_acceptable(format!(
        "Supported media types: {}, {}, {}",
        preferred_mime, APPLICATION_JSON, TEXT_HTML
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFARI: &str = "application/xml,application/xhtml+xml,text/html;q=0.9,text/plain;q=0.8,image/png,*/*;q=0.5";

    #[test]
    fn parses_safari_accept_header() {
        assert_eq!(
            parse_accept_header(SAFARI),
            vec![
                "application/xml",
                "application/xhtml+xml",
                "image/png",
                "text/html",
                "text/plain",
                "*/*",
            ]
        );
    }

    #[test]
    fn safari_gets_html() {
        let mt = negotiate(Resource::Record, None, Some(SAFARI), "sumatra").unwrap();
        assert_eq!(mt, MediaType::Html);
    }

    #[test]
    fn format_overrides_accept() {
        let mt = negotiate(Resource::Project, Some("json"), Some("text/html"), "sumatra").unwrap();
        assert_eq!(mt, MediaType::Json);
        let mt = negotiate(Resource::Record, Some("record-v3+json"), None, "sumatra").unwrap();
        assert_eq!(mt, MediaType::Vendor(Resource::Record, Version::V3));
    }

    #[test]
    fn unknown_format_is_not_acceptable() {
        let err = negotiate(Resource::Record, Some("xml"), None, "sumatra").unwrap_err();
        assert_eq!(err.status_code(), 406);
    }

    #[test]
    fn missing_or_empty_accept_selects_preferred() {
        let preferred = MediaType::Vendor(Resource::ProjectList, Version::V4);
        assert_eq!(negotiate(Resource::ProjectList, None, None, "sumatra").unwrap(), preferred);
        assert_eq!(negotiate(Resource::ProjectList, None, Some(""), "sumatra").unwrap(), preferred);
    }

    #[test]
    fn wildcard_selects_preferred() {
        let mt = negotiate(Resource::Project, None, Some("image/png, */*;q=0.1"), "sumatra").unwrap();
        assert_eq!(mt, MediaType::Vendor(Resource::Project, Version::V4));
    }

    #[test]
    fn partial_wildcards_are_not_resolved() {
        let err = negotiate(Resource::Record, None, Some("text/*"), "sumatra").unwrap_err();
        assert_eq!(err.status_code(), 406);
    }

    #[test]
    fn higher_quality_wins() {
        let mt = negotiate(
            Resource::Record,
            None,
            Some("text/html;q=0.5, application/vnd.sumatra.record-v4+json"),
            "sumatra",
        )
        .unwrap();
        assert_eq!(mt, MediaType::Vendor(Resource::Record, Version::V4));
    }

    #[test]
    fn only_preferred_vendor_type_matches() {
        // v3 by Accept header is not offered; only the format parameter selects it
        let err = negotiate(Resource::Record, None, Some("application/vnd.sumatra.record-v3+json"), "sumatra")
            .unwrap_err();
        assert_eq!(err.status_code(), 406);
    }

    #[test]
    fn permission_list_prefers_plain_json() {
        let mt = negotiate(Resource::PermissionList, None, Some("*/*"), "sumatra").unwrap();
        assert_eq!(mt, MediaType::Json);
        assert_eq!(mt.content_type("sumatra"), "application/json; charset=utf-8");
    }

    #[test]
    fn unparseable_quality_sorts_last() {
        assert_eq!(parse_accept_header("a/b;q=x, c/d;q=0.2"), vec!["c/d", "a/b"]);
    }

    #[test]
    fn vendor_mime_uses_product() {
        let mt = MediaType::Vendor(Resource::ProjectList, Version::V3);
        assert_eq!(mt.mime("acme"), "application/vnd.acme.project-list-v3+json");
    }
}
