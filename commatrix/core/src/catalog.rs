use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lookup tables that the resolvers consult.
///
/// Loaded once at startup (or built in tests) and passed by reference; nothing in the engine reads
/// these values from globals.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Catalog {
    /// Processes that run directly on the host. A socket owned by one of these is attributed to
    /// the process itself rather than traced to a container.
    pub host_services: BTreeSet<String>,

    /// Services whose listeners firewall policy may omit.
    pub optional_services: BTreeSet<String>,

    /// Node roles that are reported. Role labels naming any other role are ignored.
    pub roles: BTreeSet<String>,

    /// Label key prefix under which a node advertises its roles.
    pub role_label_prefix: String,
}

impl Default for Catalog {
    fn default() -> Self {
        let set = |names: &[&str]| -> BTreeSet<String> {
            names.iter().map(|n| n.to_string()).collect()
        };
        Self {
            host_services: set(&["rpcbind", "sshd", "rpc.statd", "crio", "systemd", "kubelet"]),
            optional_services: set(&["rpcbind", "sshd", "rpc.statd"]),
            roles: set(&["master", "worker"]),
            role_label_prefix: "node-role.kubernetes.io/".to_string(),
        }
    }
}

impl Catalog {
    #[inline]
    pub fn is_host_service(&self, process: &str) -> bool {
        self.host_services.contains(process)
    }

    #[inline]
    pub fn is_optional(&self, service: &str) -> bool {
        self.optional_services.contains(service)
    }

    /// Returns the role named by a node label key, if the key carries a reported role.
    pub fn role_from_label<'l>(&self, key: &'l str) -> Option<&'l str> {
        let role = key.strip_prefix(self.role_label_prefix.as_str())?;
        self.roles.contains(role).then_some(role)
    }
}
