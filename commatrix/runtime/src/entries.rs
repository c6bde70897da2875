use anyhow::{Context, Result};
use commatrix_core::{Catalog, Entry, Source};
use serde::de::DeserializeOwned;
use std::{fs, path::Path};
use tracing::debug;

/// Reads a list of entries from a JSON or YAML file, marking each with `source`.
pub fn load_entries(path: &Path, source: Source) -> Result<Vec<Entry>> {
    let entries = stamp(read::<Vec<Entry>>(path)?, source);
    debug!(path = %path.display(), %source, entries = entries.len(), "Loaded entries");
    Ok(entries)
}

/// Parses a YAML list of entries named `name` in errors, marking each with `source`.
pub fn parse_entries(name: &str, yaml: &str, source: Source) -> Result<Vec<Entry>> {
    let entries = serde_yaml::from_str::<Vec<Entry>>(yaml)
        .with_context(|| format!("invalid YAML in {name}"))?;
    Ok(stamp(entries, source))
}

fn stamp(mut entries: Vec<Entry>, source: Source) -> Vec<Entry> {
    for entry in &mut entries {
        entry.source = source;
    }
    entries
}

/// Reads a service catalog. Fields that are absent keep their defaults.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    read(path)
}

/// Parses `.json` files as JSON and anything else as YAML.
fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_slice(&data).with_context(|| format!("invalid JSON in {}", path.display()))
    } else {
        serde_yaml::from_slice(&data).with_context(|| format!("invalid YAML in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commatrix_core::Protocol;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_json_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "custom.json",
            r#"[
                {"direction": "Ingress", "protocol": "TCP", "port": 9637,
                 "nodeRole": "worker", "service": "kube-rbac-proxy-crio", "required": true},
                {"direction": "Ingress", "protocol": "udp", "port": "500",
                 "nodeRole": "master", "service": "ipsec"}
            ]"#,
        );

        let entries = load_entries(&path, Source::Custom).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].port.get(), 9637);
        assert_eq!(entries[1].protocol, Protocol::Udp);
        assert_eq!(entries[1].port.get(), 500);
        assert!(entries[1].required, "required defaults to true");
        assert!(entries.iter().all(|e| e.source == Source::Custom));
    }

    #[test]
    fn loads_yaml_entries_as_static() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "static.yaml",
            "- direction: Ingress\n  \
               protocol: TCP\n  \
               port: 22\n  \
               nodeRole: worker\n  \
               service: sshd\n  \
               required: false\n  \
               source: custom\n",
        );

        let entries = load_entries(&path, Source::Static).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].service, "sshd");
        assert!(!entries[0].required);
        assert_eq!(entries[0].source, Source::Static);
    }

    #[test]
    fn rejects_invalid_ports() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "bad.json",
            r#"[{"direction": "Ingress", "protocol": "TCP", "port": 0, "nodeRole": "worker"}]"#,
        );
        let err = load_entries(&path, Source::Custom).unwrap_err();
        assert!(format!("{err:#}").contains("bad.json"), "{err:#}");
    }

    #[test]
    fn catalog_fields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "catalog.yaml", "hostServices: [kubelet, chronyd]\n");

        let catalog = load_catalog(&path).unwrap();
        assert!(catalog.is_host_service("chronyd"));
        assert!(!catalog.is_host_service("sshd"));
        assert!(catalog.is_optional("sshd"), "optional services keep their default");
        assert_eq!(
            catalog.role_from_label("node-role.kubernetes.io/master"),
            Some("master")
        );
    }
}
