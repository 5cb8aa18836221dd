//! Security context for content access
//!
//! Read access to content paths is decided by an access policy for the
//! roles of the executing account. Batch operations may run a unit of work
//! without authorization checks; the elevation is scoped to that unit and
//! released on every exit path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Access level granted by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    /// No access
    None,
    /// Read-only access
    Read,
    /// Read/write access
    Write,
}

/// Access policy trait
pub trait AccessPolicy: Send + Sync {
    /// Whether any of `roles` may read the content at `path`
    fn can_read(&self, roles: &[String], path: &str) -> bool;
}

/// Policy granting everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_read(&self, _roles: &[String], _path: &str) -> bool {
        true
    }
}

/// Rule of one role (or everyone, for `role == None`) at one path
#[derive(Debug, Clone)]
struct AccessRule {
    role: Option<String>,
    level: AccessLevel,
}

/// Path based access policy
///
/// Format:
/// ```text
/// # everyone may read, except below /sites/acme/intern
/// [/sites/acme/intern]
/// * =
/// Acme.Editor = r
/// ```
///
/// The most specific path carrying a rule that applies decides. Paths
/// without any applicable rule are readable.
#[derive(Debug, Clone, Default)]
pub struct PathAccessPolicy {
    rules: HashMap<String, Vec<AccessRule>>,
}

impl PathAccessPolicy {
    /// Parse policy content
    pub fn from_content(content: &str) -> Result<Self, String> {
        let mut rules: HashMap<String, Vec<AccessRule>> = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let section = line[1..line.len() - 1].trim();
                if !section.starts_with('/') {
                    return Err(format!("Section must be an absolute path: {}", section));
                }
                current_section = Some(section.trim_end_matches('/').to_string());
                continue;
            }

            let Some(section) = &current_section else {
                return Err(format!("Rule outside of a path section: {}", line));
            };
            let (role, level) = Self::parse_rule(line)?;
            let path = if section.is_empty() { "/".to_string() } else { section.clone() };
            rules.entry(path).or_default().push(AccessRule { role, level });
        }

        Ok(Self { rules })
    }

    /// Parse `role = r|rw|` (empty for no access)
    fn parse_rule(line: &str) -> Result<(Option<String>, AccessLevel), String> {
        let (role, access) = line
            .split_once('=')
            .ok_or_else(|| format!("Invalid access rule: {}", line))?;
        let role = role.trim();
        if role.is_empty() {
            return Err(format!("Missing role in access rule: {}", line));
        }
        let level = match access.trim().to_lowercase().as_str() {
            "r" | "read" => AccessLevel::Read,
            "rw" | "w" | "write" | "read-write" => AccessLevel::Write,
            "" => AccessLevel::None,
            other => return Err(format!("Invalid access level: {}", other)),
        };
        let role = if role == "*" { None } else { Some(role.to_string()) };
        Ok((role, level))
    }

    /// Level decided by the rules of one path, if any applies
    fn level_at(&self, roles: &[String], path: &str) -> Option<AccessLevel> {
        let rules = self.rules.get(path)?;
        let role_levels: Vec<AccessLevel> = rules
            .iter()
            .filter(|rule| {
                rule.role
                    .as_ref()
                    .is_some_and(|role| roles.iter().any(|r| r == role))
            })
            .map(|rule| rule.level)
            .collect();
        if !role_levels.is_empty() {
            // the most permissive role grant wins
            return role_levels.into_iter().max_by_key(|level| match level {
                AccessLevel::None => 0,
                AccessLevel::Read => 1,
                AccessLevel::Write => 2,
            });
        }
        rules
            .iter()
            .find(|rule| rule.role.is_none())
            .map(|rule| rule.level)
    }
}

impl AccessPolicy for PathAccessPolicy {
    fn can_read(&self, roles: &[String], path: &str) -> bool {
        let mut current = Some(path);
        while let Some(p) = current {
            if let Some(level) = self.level_at(roles, p) {
                return level != AccessLevel::None;
            }
            current = crate::node::paths::parent_of(p);
        }
        true
    }
}

/// Security context of the executing account
pub struct SecurityContext {
    roles: Vec<String>,
    policy: Arc<dyn AccessPolicy>,
    elevation: AtomicUsize,
}

impl SecurityContext {
    pub fn new(roles: Vec<String>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self {
            roles,
            policy,
            elevation: AtomicUsize::new(0),
        }
    }

    /// Context without any access restriction
    pub fn unrestricted() -> Self {
        Self::new(Vec::new(), Arc::new(AllowAll))
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Whether authorization checks are currently bypassed
    pub fn is_elevated(&self) -> bool {
        self.elevation.load(Ordering::SeqCst) > 0
    }

    /// Whether content at `path` may be read
    pub fn can_read(&self, path: &str) -> bool {
        self.is_elevated() || self.policy.can_read(&self.roles, path)
    }

    /// Run `work` with authorization checks disabled
    pub fn without_authorization_checks<T>(&self, work: impl FnOnce() -> T) -> T {
        let _guard = ElevationGuard::acquire(self);
        work()
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("roles", &self.roles)
            .field("elevated", &self.is_elevated())
            .finish()
    }
}

struct ElevationGuard<'a> {
    context: &'a SecurityContext,
}

impl<'a> ElevationGuard<'a> {
    fn acquire(context: &'a SecurityContext) -> Self {
        context.elevation.fetch_add(1, Ordering::SeqCst);
        Self { context }
    }
}

impl Drop for ElevationGuard<'_> {
    fn drop(&mut self) {
        self.context.elevation.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "
        # internal pages
        [/sites/acme/intern]
        * =
        Acme.Editor = r

        [/sites/acme/intern/public]
        * = r
    ";

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_most_specific_path_wins() {
        let policy = PathAccessPolicy::from_content(POLICY).unwrap();
        assert!(policy.can_read(&[], "/sites/acme/home"));
        assert!(!policy.can_read(&[], "/sites/acme/intern"));
        assert!(!policy.can_read(&[], "/sites/acme/intern/team"));
        assert!(policy.can_read(&[], "/sites/acme/intern/public/faq"));
    }

    #[test]
    fn test_role_rule_overrides_wildcard() {
        let policy = PathAccessPolicy::from_content(POLICY).unwrap();
        assert!(policy.can_read(&roles(&["Acme.Editor"]), "/sites/acme/intern/team"));
        assert!(!policy.can_read(&roles(&["Acme.Guest"]), "/sites/acme/intern/team"));
    }

    #[test]
    fn test_invalid_policies() {
        assert!(PathAccessPolicy::from_content("* = r").is_err());
        assert!(PathAccessPolicy::from_content("[/a]\n* = x").is_err());
        assert!(PathAccessPolicy::from_content("[a]\n* = r").is_err());
        assert!(PathAccessPolicy::from_content("[/a]\nno-equals").is_err());
    }

    #[test]
    fn test_elevation_is_scoped() {
        let policy = PathAccessPolicy::from_content(POLICY).unwrap();
        let security = SecurityContext::new(Vec::new(), Arc::new(policy));
        assert!(!security.can_read("/sites/acme/intern"));

        let inside = security.without_authorization_checks(|| {
            assert!(security.is_elevated());
            security.can_read("/sites/acme/intern")
        });
        assert!(inside);
        assert!(!security.is_elevated());
    }

    #[test]
    fn test_elevation_released_on_error() {
        let security = SecurityContext::unrestricted();
        let result: Result<(), String> =
            security.without_authorization_checks(|| Err("failed".to_string()));
        assert!(result.is_err());
        assert!(!security.is_elevated());
    }

    #[test]
    fn test_elevation_released_on_panic() {
        let security = SecurityContext::unrestricted();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            security.without_authorization_checks::<()>(|| panic!("boom"))
        }));
        assert!(outcome.is_err());
        assert!(!security.is_elevated());
    }

    #[test]
    fn test_nested_elevation() {
        let security = SecurityContext::unrestricted();
        security.without_authorization_checks(|| {
            security.without_authorization_checks(|| assert!(security.is_elevated()));
            assert!(security.is_elevated());
        });
        assert!(!security.is_elevated());
    }
}
