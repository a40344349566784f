//! Host discovery from an OpenSSH client configuration file
//!
//! Only concrete `Host` aliases are surfaced; wildcard and negated patterns
//! describe defaults rather than destinations. Within a block the first value
//! of a directive wins, as it does for ssh itself.

use std::collections::HashSet;
use std::path::Path;

use agentdeck_types::{HostSource, SshHost, DEFAULT_SSH_PORT};
use tracing::{debug, warn};

/// Prefix for ids of hosts discovered in the config file
pub const CONFIG_HOST_PREFIX: &str = "ssh-config:";

#[derive(Debug, Default)]
struct HostBlock {
    aliases: Vec<String>,
    hostname: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    identity_file: Option<String>,
}

impl HostBlock {
    fn apply(&mut self, keyword: &str, value: &str) {
        match keyword {
            "hostname" => set_once(&mut self.hostname, value.to_string()),
            "user" => set_once(&mut self.user, value.to_string()),
            "identityfile" => set_once(&mut self.identity_file, value.to_string()),
            "port" => match value.parse::<u16>() {
                Ok(port) if port > 0 => set_once(&mut self.port, port),
                _ => debug!(value, "ignoring invalid Port in ssh config"),
            },
            _ => {}
        }
    }

    fn into_hosts(self) -> impl Iterator<Item = SshHost> {
        let HostBlock {
            aliases,
            hostname,
            port,
            user,
            identity_file,
        } = self;
        aliases.into_iter().map(move |alias| SshHost {
            id: format!("{}{}", CONFIG_HOST_PREFIX, alias),
            hostname: hostname.clone().unwrap_or_else(|| alias.clone()),
            name: alias,
            port: port.unwrap_or(DEFAULT_SSH_PORT),
            user: user.clone(),
            identity_file: identity_file.clone(),
            source: HostSource::Config,
        })
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

/// Parse config text into host entries, in file order
pub fn parse_ssh_config(content: &str) -> Vec<SshHost> {
    let mut blocks = Vec::new();
    let mut current: Option<HostBlock> = None;

    for line in content.lines() {
        let Some((keyword, value)) = split_directive(line) else {
            continue;
        };

        match keyword.as_str() {
            "host" => {
                blocks.extend(current.take());
                let aliases = value
                    .split_whitespace()
                    .map(unquote)
                    .filter(|pattern| is_concrete_alias(pattern))
                    .map(str::to_string)
                    .collect();
                current = Some(HostBlock {
                    aliases,
                    ..HostBlock::default()
                });
            }
            // A Match block's directives don't belong to the preceding Host
            "match" => blocks.extend(current.take()),
            _ => {
                if let Some(block) = current.as_mut() {
                    block.apply(&keyword, unquote(&value));
                }
            }
        }
    }
    blocks.extend(current);

    let mut seen = HashSet::new();
    blocks
        .into_iter()
        .flat_map(HostBlock::into_hosts)
        .filter(|host| seen.insert(host.name.clone()))
        .collect()
}

/// Read and parse a config file; a missing file yields no hosts
pub fn load_ssh_config_hosts(path: &Path) -> Vec<SshHost> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_ssh_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read ssh config");
            Vec::new()
        }
    }
}

/// Split `Keyword value`, `Keyword=value` or `Keyword = value`; keyword lowercased
fn split_directive(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (keyword, rest) = line.split_at(split_at);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    if rest.is_empty() {
        return None;
    }
    Some((keyword.to_ascii_lowercase(), rest.to_string()))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn is_concrete_alias(pattern: &str) -> bool {
    !pattern.is_empty() && !pattern.contains(['*', '?', '!'])
}
