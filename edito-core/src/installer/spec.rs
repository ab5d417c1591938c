//! Plugin install requests and their git references

use edito_plugin_api::ConfigDirective;

/// Version request meaning "whatever the default branch has"
pub const LATEST: &str = "latest";

/// A request to build a plugin from a git repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    /// Name the artifact is stored and loaded under; also the cargo package
    pub name: String,
    pub repository: String,
    /// `latest`, a tag, a branch or a commit hash
    pub version: String,
}

impl PluginSpec {
    pub fn new(
        name: impl Into<String>,
        repository: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            version: version.into(),
        }
    }

    /// The spec for an `install_plugin` directive
    pub fn from_directive(directive: &ConfigDirective) -> Option<Self> {
        match directive {
            ConfigDirective::InstallPlugin {
                name,
                repository,
                version,
            } => Some(Self::new(name, repository, version)),
            _ => None,
        }
    }

    /// Repository URL with a scheme
    pub fn git_url(&self) -> String {
        let repository = self.repository.trim();
        if repository.contains("://") || repository.starts_with("git@") {
            repository.to_string()
        } else {
            format!("https://{repository}")
        }
    }

    pub fn pin(&self) -> Option<GitPin> {
        GitPin::resolve(&self.version)
    }

    /// Cargo dependency table for the plugin crate
    pub fn dependency(&self) -> toml::Value {
        let mut table = toml::Table::new();
        table.insert("git".to_string(), toml::Value::String(self.git_url()));
        if let Some(pin) = self.pin() {
            let (key, value) = pin.manifest_entry();
            table.insert(key.to_string(), toml::Value::String(value.to_string()));
        }
        table.insert("package".to_string(), toml::Value::String(self.name.clone()));
        toml::Value::Table(table)
    }
}

/// What a version string pins the git dependency to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitPin {
    Rev(String),
    Tag(String),
    Branch(String),
}

impl GitPin {
    /// `latest` or empty pins nothing; 40 hex digits are a commit; a leading
    /// digit, optionally after `v`, is a tag; anything else is a branch.
    pub fn resolve(version: &str) -> Option<Self> {
        let version = version.trim();
        if version.is_empty() || version.eq_ignore_ascii_case(LATEST) {
            return None;
        }
        if version.len() == 40 && version.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(GitPin::Rev(version.to_string()));
        }
        let unprefixed = version.strip_prefix('v').unwrap_or(version);
        if unprefixed.starts_with(|c: char| c.is_ascii_digit()) {
            return Some(GitPin::Tag(version.to_string()));
        }
        Some(GitPin::Branch(version.to_string()))
    }

    fn manifest_entry(&self) -> (&'static str, &str) {
        match self {
            GitPin::Rev(v) => ("rev", v),
            GitPin::Tag(v) => ("tag", v),
            GitPin::Branch(v) => ("branch", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_resolution() {
        assert_eq!(GitPin::resolve("latest"), None);
        assert_eq!(GitPin::resolve(""), None);
        assert_eq!(GitPin::resolve("v0.1.0"), Some(GitPin::Tag("v0.1.0".into())));
        assert_eq!(GitPin::resolve("2.0"), Some(GitPin::Tag("2.0".into())));
        assert_eq!(GitPin::resolve("main"), Some(GitPin::Branch("main".into())));
        assert_eq!(GitPin::resolve("vnext"), Some(GitPin::Branch("vnext".into())));

        let sha = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(GitPin::resolve(sha), Some(GitPin::Rev(sha.into())));
    }

    #[test]
    fn test_bare_host_gains_scheme() {
        let spec = PluginSpec::new("file-tree", "github.com/acme/edito-file-tree", "latest");
        assert_eq!(spec.git_url(), "https://github.com/acme/edito-file-tree");

        let spec = PluginSpec::new("x", "ssh://git@example.com/x.git", "latest");
        assert_eq!(spec.git_url(), "ssh://git@example.com/x.git");
    }

    #[test]
    fn test_dependency_table() {
        let spec = PluginSpec::new("file-tree", "github.com/acme/edito-file-tree", "v0.1.0");
        let dep = spec.dependency();
        assert_eq!(dep["git"].as_str(), Some("https://github.com/acme/edito-file-tree"));
        assert_eq!(dep["tag"].as_str(), Some("v0.1.0"));
        assert_eq!(dep["package"].as_str(), Some("file-tree"));

        let latest = PluginSpec::new("file-tree", "github.com/acme/edito-file-tree", "latest");
        let dep = latest.dependency();
        let table = dep.as_table().unwrap();
        assert!(!table.contains_key("tag") && !table.contains_key("branch"));
    }

    #[test]
    fn test_from_directive() {
        let directive = ConfigDirective::InstallPlugin {
            name: "a".into(),
            repository: "github.com/x/a".into(),
            version: "main".into(),
        };
        assert_eq!(
            PluginSpec::from_directive(&directive),
            Some(PluginSpec::new("a", "github.com/x/a", "main"))
        );
        assert_eq!(
            PluginSpec::from_directive(&ConfigDirective::LoadPlugin { name: "a".into() }),
            None
        );
    }
}
