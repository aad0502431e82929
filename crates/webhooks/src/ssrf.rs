//! SSRF guard for webhook targets.
//!
//! Applied at config-write time: the hostname is checked against a small
//! denylist of well-known metadata endpoints, then every address the host
//! resolves to is checked against the private/special ranges. A host that
//! resolves to even one private address is rejected, as is a host that does
//! not resolve at all.

use std::net::IpAddr;

use {ipnet::IpNet, once_cell::sync::Lazy, url::Url};

/// Hostnames rejected outright, case-insensitively.
pub const BLOCKED_HOSTS: &[&str] = &[
    "metadata.google.internal",
    "169.254.169.254",
    "metadata.azure.com",
];

/// Private, loopback, link-local, multicast and reserved ranges.
#[allow(clippy::expect_used)]
static BLOCKED_NETWORKS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "0.0.0.0/8",
        "224.0.0.0/4",
        "240.0.0.0/4",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .map(|net| net.parse().expect("static CIDR literal"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SsrfRejection {
    #[error("target URL is not valid: {url}")]
    InvalidUrl { url: String },

    #[error("target host is blocked: {host}")]
    BlockedHost { host: String },

    #[error("target host {host} resolves to a private address ({ip})")]
    PrivateAddress { host: String, ip: IpAddr },

    #[error("target host does not resolve: {host}")]
    Resolution { host: String },
}

/// Check a webhook target URL. `Ok(())` means safe to store.
pub async fn check_url(target: &str) -> Result<(), SsrfRejection> {
    let parsed = Url::parse(target).map_err(|_| SsrfRejection::InvalidUrl {
        url: target.to_string(),
    })?;

    let host = match parsed.host() {
        Some(host) => host,
        None => {
            return Err(SsrfRejection::InvalidUrl {
                url: target.to_string(),
            });
        },
    };

    match host {
        url::Host::Ipv4(ip) => check_ip(IpAddr::V4(ip), &ip.to_string()),
        url::Host::Ipv6(ip) => check_ip(IpAddr::V6(ip), &ip.to_string()),
        url::Host::Domain(domain) => {
            let lowered = domain.to_ascii_lowercase();
            if BLOCKED_HOSTS.contains(&lowered.as_str()) {
                return Err(SsrfRejection::BlockedHost { host: lowered });
            }

            let port = parsed.port_or_known_default().unwrap_or(80);
            let lookup_result = tokio::net::lookup_host((lowered.clone(), port)).await;
            let addrs: Vec<IpAddr> = match lookup_result {
                Ok(addrs) => addrs.map(|a| a.ip()).collect(),
                Err(_) => {
                    return Err(SsrfRejection::Resolution { host: lowered });
                },
            };
            if addrs.is_empty() {
                return Err(SsrfRejection::Resolution { host: lowered });
            }

            for ip in addrs {
                check_ip(ip, &lowered)?;
            }
            Ok(())
        },
    }
}

fn check_ip(ip: IpAddr, host: &str) -> Result<(), SsrfRejection> {
    if BLOCKED_HOSTS.contains(&host.to_ascii_lowercase().as_str()) {
        return Err(SsrfRejection::BlockedHost {
            host: host.to_string(),
        });
    }
    if is_blocked_ip(ip) {
        return Err(SsrfRejection::PrivateAddress {
            host: host.to_string(),
            ip,
        });
    }
    Ok(())
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return true;
    }
    BLOCKED_NETWORKS.iter().any(|net| net.contains(&ip))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metadata_hosts_are_blocked_without_resolution() {
        for target in [
            "http://metadata.google.internal/computeMetadata",
            "http://METADATA.GOOGLE.INTERNAL/x",
            "https://metadata.azure.com/instance",
        ] {
            let err = check_url(target).await.unwrap_err();
            assert!(matches!(err, SsrfRejection::BlockedHost { .. }), "{target}");
        }
    }

    #[tokio::test]
    async fn metadata_ip_literal_is_blocked() {
        let err = check_url("http://169.254.169.254/latest/meta-data")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SsrfRejection::BlockedHost { .. } | SsrfRejection::PrivateAddress { .. }
        ));
    }

    #[tokio::test]
    async fn private_ip_literals_are_rejected() {
        for target in [
            "http://10.1.2.3/hook",
            "http://172.16.0.9/hook",
            "http://172.31.255.1/hook",
            "http://192.168.1.1/hook",
            "http://127.0.0.1:8000/hook",
            "http://0.0.0.0/hook",
            "http://224.0.0.5/hook",
            "http://240.0.0.1/hook",
            "http://[::1]/hook",
            "http://[fc00::1]/hook",
            "http://[fe80::1]/hook",
        ] {
            let err = check_url(target).await.unwrap_err();
            assert!(
                matches!(err, SsrfRejection::PrivateAddress { .. }),
                "{target}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn public_ip_literals_pass() {
        assert!(check_url("http://93.184.216.34/hook").await.is_ok());
        assert!(check_url("https://8.8.8.8/hook").await.is_ok());
        // 172.32.0.0 is just past the 172.16/12 block.
        assert!(check_url("http://172.32.0.1/hook").await.is_ok());
    }

    #[tokio::test]
    async fn localhost_resolves_to_loopback_and_is_rejected() {
        let err = check_url("http://localhost:9000/hook").await.unwrap_err();
        assert!(matches!(err, SsrfRejection::PrivateAddress { .. }));
    }

    #[tokio::test]
    async fn unresolvable_host_is_rejected() {
        // RFC 2606 reserves .invalid; resolution always fails.
        let err = check_url("http://does-not-exist.invalid/hook")
            .await
            .unwrap_err();
        assert!(matches!(err, SsrfRejection::Resolution { .. }));
    }

    #[tokio::test]
    async fn garbage_urls_are_invalid() {
        assert!(matches!(
            check_url("not a url").await.unwrap_err(),
            SsrfRejection::InvalidUrl { .. }
        ));
    }
}
