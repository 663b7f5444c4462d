// packages/interceptor/src/interception/rules.rs
//! Static rules from configuration: URL mappings and header injection

use crate::interception::handle::HandlerKey;
use crate::interception::message::InterceptedRequest;
use crate::interception::table::HandlerTable;
use crate::utils::config::{HeaderRule, InterceptorConfig};
use crate::utils::errors::{InterceptError, Result};
use hyper::header::{HeaderName, HeaderValue};
use tracing::info;

/// Install every configured mapping and header rule into `table`
pub fn install(table: &HandlerTable, config: &InterceptorConfig) -> Result<Vec<HandlerKey>> {
    let mut keys = Vec::with_capacity(config.mappings.len() + config.headers.len());

    for mapping in &config.mappings {
        keys.push(table.map_url(&mapping.url, mapping.local_path.clone())?);
    }

    for rule in &config.headers {
        keys.push(install_header_rule(table, rule)?);
    }

    info!(
        "Installed {} mappings and {} header rules",
        config.mappings.len(),
        config.headers.len()
    );
    Ok(keys)
}

/// Register a preprocessor that sets `rule.name: rule.value` on passthrough
/// requests, limited to `rule.host` when given
pub fn install_header_rule(table: &HandlerTable, rule: &HeaderRule) -> Result<HandlerKey> {
    let name = HeaderName::from_bytes(rule.name.as_bytes())
        .map_err(|e| InterceptError::InvalidHeader(format!("{}: {}", rule.name, e)))?;
    let value = HeaderValue::from_str(&rule.value)
        .map_err(|e| InterceptError::InvalidHeader(format!("{}: {}", rule.name, e)))?;
    let host = rule.host.as_ref().map(|h| h.to_ascii_lowercase());

    Ok(table.add_preprocessor(move |request: &mut InterceptedRequest| {
        let applies = match &host {
            Some(host) => request
                .host()
                .map(|h| h.eq_ignore_ascii_case(host))
                .unwrap_or(false),
            None => true,
        };

        if applies {
            request.headers.insert(name.clone(), value.clone());
        }
    }))
}
