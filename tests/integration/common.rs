//! Shared fixtures

use std::sync::Arc;
use sumi_harvest::config::RequestPolicyConfig;
use sumi_harvest::fetch::{Fetcher, ProxyPool, RequestPolicy, UserAgentRotator};

pub const TEST_AGENT: &str = "SumiHarvestTest/1.0";

/// Policy with no politeness delay and millisecond backoff
pub fn fast_policy(max_retries: u32) -> RequestPolicyConfig {
    RequestPolicyConfig {
        min_delay: 0.0,
        max_delay: 0.0,
        timeout: 5.0,
        max_retries,
        backoff_multiplier: 0.01,
        max_concurrent_requests: 4,
        proxy_cooldown: 300,
    }
}

pub fn fetcher_with(policy: RequestPolicyConfig, proxies: Option<Arc<ProxyPool>>) -> Arc<Fetcher> {
    let fetcher = Fetcher::new(
        RequestPolicy::from_config(&policy),
        UserAgentRotator::new(vec![TEST_AGENT.to_string()]),
        proxies,
    )
    .expect("fetcher");
    Arc::new(fetcher)
}

pub fn fetcher(max_retries: u32) -> Arc<Fetcher> {
    fetcher_with(fast_policy(max_retries), None)
}

/// Wraps listing rows in the `.list` markup used by the news and legal sites
pub fn listing(rows: &[(&str, &str, Option<&str>)]) -> String {
    let items: String = rows
        .iter()
        .map(|(href, title, date)| match date {
            Some(date) => format!("<li><a href=\"{href}\">{title}</a><span>{date}</span></li>"),
            None => format!("<li><a href=\"{href}\">{title}</a></li>"),
        })
        .collect();
    format!("<html><body><ul class=\"list\">{items}</ul></body></html>")
}

pub fn article(text: &str) -> String {
    format!("<html><body><div class=\"article\"><p>{text}</p></div></body></html>")
}
