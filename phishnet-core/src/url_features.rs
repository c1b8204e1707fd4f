//! Heuristic URL feature extraction.
//!
//! Maps a single URL onto the 30 feature columns of the phishing dataset.
//! Only a handful of columns can be derived from the URL string alone; the
//! rest depend on enrichment sources (WHOIS age, traffic rank, page content)
//! that are not available at request time. Those are reported as
//! [`FeatureValue::Unknown`] carrying the placeholder value the training data
//! uses for them, so callers can tell a measured value from a stand-in.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

static IPV4: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+\.\d+").ok());

const SHORTENERS: &[&str] = &["bit.ly", "tinyurl", "goo.gl"];
const SENSITIVE_KEYWORDS: &[&str] = &["login", "verify", "secure", "bank", "account"];

/// A single extracted feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FeatureValue {
    /// Measured from the URL string.
    Observed(f64),
    /// Not derivable from the URL; the value is a placeholder.
    Unknown(f64),
}

impl FeatureValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Observed(v) | Self::Unknown(v) => v,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// Feature record for one URL, in dataset column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlFeatures {
    pub url: String,
    pub features: Vec<(String, FeatureValue)>,
}

impl UrlFeatures {
    pub fn get(&self, column: &str) -> Option<FeatureValue> {
        self.features
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| *v)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.features.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.features.iter().map(|(_, v)| v.as_f64()).collect()
    }

    /// Number of columns filled with placeholders.
    pub fn unknown_count(&self) -> usize {
        self.features.iter().filter(|(_, v)| v.is_unknown()).count()
    }
}

/// The parts of a URL the heuristics look at.
struct UrlParts {
    scheme: String,
    /// Authority exactly as written: userinfo, host and any port, default
    /// ports included.
    netloc: String,
    has_port: bool,
}

impl UrlParts {
    fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if url.has_authority() => {
                let netloc = raw
                    .split_once("://")
                    .map(|(_, rest)| rest.split(['/', '?', '#']).next().unwrap_or(""))
                    .unwrap_or("")
                    .to_string();
                Self {
                    scheme: url.scheme().to_string(),
                    has_port: explicit_port(&netloc),
                    netloc,
                }
            }
            Ok(url) => Self {
                scheme: url.scheme().to_string(),
                netloc: String::new(),
                has_port: false,
            },
            // Scheme-less input such as "example.com/login" has no authority.
            Err(_) => Self {
                scheme: String::new(),
                netloc: String::new(),
                has_port: false,
            },
        }
    }
}

/// Whether the authority names a numeric port, even the scheme's default.
fn explicit_port(netloc: &str) -> bool {
    let host_port = netloc.rsplit('@').next().unwrap_or(netloc);
    let after_host = match host_port.rfind(']') {
        Some(end) => &host_port[end + 1..],
        None => host_port,
    };
    after_host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

fn flag(b: bool) -> FeatureValue {
    FeatureValue::Observed(if b { 1.0 } else { 0.0 })
}

/// Extract the dataset feature record for `url`.
pub fn extract_url_features(url: &str) -> UrlFeatures {
    let parts = UrlParts::parse(url);
    let unknown = FeatureValue::Unknown;

    let features: Vec<(&str, FeatureValue)> = vec![
        (
            "having_IP_Address",
            flag(IPV4.as_ref().is_some_and(|re| re.is_match(url))),
        ),
        (
            "URL_Length",
            FeatureValue::Observed(url.chars().count() as f64),
        ),
        (
            "Shortining_Service",
            flag(SHORTENERS.iter().any(|s| url.contains(s))),
        ),
        ("having_At_Symbol", flag(url.contains('@'))),
        ("double_slash_redirecting", flag(url.matches("//").count() > 1)),
        ("Prefix_Suffix", flag(parts.netloc.contains('-'))),
        (
            "having_Sub_Domain",
            FeatureValue::Observed(parts.netloc.matches('.').count() as f64 - 1.0),
        ),
        ("SSLfinal_State", flag(parts.scheme == "https")),
        ("Domain_registeration_length", unknown(-1.0)),
        ("Favicon", unknown(1.0)),
        ("port", flag(parts.has_port)),
        ("HTTPS_token", flag(parts.netloc.contains("https"))),
        ("Request_URL", unknown(-1.0)),
        ("URL_of_Anchor", unknown(-1.0)),
        ("Links_in_tags", unknown(-1.0)),
        ("SFH", unknown(-1.0)),
        ("Submitting_to_email", flag(url.contains("mailto:"))),
        ("Abnormal_URL", unknown(0.0)),
        ("Redirect", flag(url.matches("http").count() > 1)),
        ("on_mouseover", unknown(-1.0)),
        ("RightClick", unknown(-1.0)),
        ("popUpWidnow", unknown(-1.0)),
        ("Iframe", unknown(-1.0)),
        ("age_of_domain", unknown(-1.0)),
        ("DNSRecord", unknown(1.0)),
        ("web_traffic", unknown(-1.0)),
        ("Page_Rank", unknown(-1.0)),
        ("Google_Index", unknown(1.0)),
        ("Links_pointing_to_page", unknown(-1.0)),
        ("Statistical_report", unknown(-1.0)),
    ];

    UrlFeatures {
        url: url.to_string(),
        features: features
            .into_iter()
            .map(|(name, v)| (name.to_string(), v))
            .collect(),
    }
}

/// Human-readable rule indicators that complement the model verdict.
pub fn rule_signals(url: &str) -> Vec<&'static str> {
    let lower = url.to_lowercase();
    let mut signals = Vec::new();

    if SHORTENERS.iter().any(|s| lower.contains(s)) {
        signals.push("Shortened URL");
    }
    if lower.contains('@') {
        signals.push("@ symbol in URL");
    }
    if lower.starts_with("http://") && SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        signals.push("HTTP + sensitive keywords");
    }
    signals
}
