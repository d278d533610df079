// src/core/enrichment/provider.rs

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::core::models::{HostingProvider, IpInfo};

/// Which metadata field a rule inspects.
enum Field {
    Org,
    Isp,
    As,
}

/// A rule that attributes an address to a hosting platform.
struct ProviderRule<'a> {
    provider: HostingProvider,
    field: Field,
    pattern: &'a Lazy<Regex>,
}

static RE_CLOUDFLARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)cloudflare").unwrap());
static RE_VERCEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)vercel").unwrap());
static RE_AWS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bamazon|\baws\b").unwrap());
static RE_GOOGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bgoogle").unwrap());
static RE_AZURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)microsoft|azure").unwrap());
static RE_DIGITALOCEAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)digital\s*ocean").unwrap());

/// Checked in order; the first match wins.
static RULES: &[ProviderRule] = &[
    ProviderRule { provider: HostingProvider::Cloudflare, field: Field::Org, pattern: &RE_CLOUDFLARE },
    ProviderRule { provider: HostingProvider::Vercel, field: Field::Org, pattern: &RE_VERCEL },
    ProviderRule { provider: HostingProvider::Aws, field: Field::Org, pattern: &RE_AWS },
    ProviderRule { provider: HostingProvider::GoogleCloud, field: Field::Org, pattern: &RE_GOOGLE },
    ProviderRule { provider: HostingProvider::Azure, field: Field::Org, pattern: &RE_AZURE },
    ProviderRule { provider: HostingProvider::DigitalOcean, field: Field::Org, pattern: &RE_DIGITALOCEAN },
    ProviderRule { provider: HostingProvider::Cloudflare, field: Field::Isp, pattern: &RE_CLOUDFLARE },
    ProviderRule { provider: HostingProvider::Aws, field: Field::Isp, pattern: &RE_AWS },
    ProviderRule { provider: HostingProvider::GoogleCloud, field: Field::Isp, pattern: &RE_GOOGLE },
    ProviderRule { provider: HostingProvider::Azure, field: Field::Isp, pattern: &RE_AZURE },
    ProviderRule { provider: HostingProvider::DigitalOcean, field: Field::Isp, pattern: &RE_DIGITALOCEAN },
    ProviderRule { provider: HostingProvider::Cloudflare, field: Field::As, pattern: &RE_CLOUDFLARE },
    ProviderRule { provider: HostingProvider::Aws, field: Field::As, pattern: &RE_AWS },
    ProviderRule { provider: HostingProvider::DigitalOcean, field: Field::As, pattern: &RE_DIGITALOCEAN },
];

/// Attributes IP metadata to a known hosting platform.
pub fn classify(info: Option<&IpInfo>) -> HostingProvider {
    let Some(info) = info else {
        return HostingProvider::Unknown;
    };

    for rule in RULES {
        let text = match rule.field {
            Field::Org => &info.org,
            Field::Isp => &info.isp,
            Field::As => &info.asn,
        };
        if rule.pattern.is_match(text) {
            debug!(provider = %rule.provider, text = %text, "Hosting provider rule matched.");
            return rule.provider;
        }
    }

    HostingProvider::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn info(org: &str, isp: &str, asn: &str) -> IpInfo {
        IpInfo {
            query: "203.0.113.7".to_string(),
            status: "success".to_string(),
            isp: isp.to_string(),
            org: org.to_string(),
            asn: asn.to_string(),
            message: None,
        }
    }

    #[rstest]
    #[case("Cloudflare, Inc.", "Cloudflare, Inc.", "AS13335 Cloudflare, Inc.", HostingProvider::Cloudflare)]
    #[case("Vercel Inc", "Amazon.com", "AS16509 Amazon.com, Inc.", HostingProvider::Vercel)]
    #[case("AWS EC2 (us-east-1)", "Amazon.com, Inc.", "AS14618 Amazon.com, Inc.", HostingProvider::Aws)]
    #[case("Google LLC", "Google LLC", "AS15169 Google LLC", HostingProvider::GoogleCloud)]
    #[case("Microsoft Azure Cloud (eastus)", "Microsoft Corporation", "AS8075", HostingProvider::Azure)]
    #[case("DigitalOcean, LLC", "DigitalOcean, LLC", "AS14061 DigitalOcean, LLC", HostingProvider::DigitalOcean)]
    #[case("", "Amazon Technologies Inc.", "", HostingProvider::Aws)]
    #[case("", "", "AS14061 DigitalOcean, LLC", HostingProvider::DigitalOcean)]
    #[case("Hetzner Online GmbH", "Hetzner Online GmbH", "AS24940", HostingProvider::Unknown)]
    fn classifies_known_platforms(
        #[case] org: &str,
        #[case] isp: &str,
        #[case] asn: &str,
        #[case] expected: HostingProvider,
    ) {
        assert_eq!(classify(Some(&info(org, isp, asn))), expected);
    }

    #[test]
    fn missing_or_placeholder_metadata_is_unknown() {
        assert_eq!(classify(None), HostingProvider::Unknown);
        assert_eq!(classify(Some(&IpInfo::unknown())), HostingProvider::Unknown);
    }
}
