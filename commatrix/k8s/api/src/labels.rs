//! Well-known label keys.

/// Set by the endpoint-slice controller to the name of the owning service.
pub const SERVICE_NAME: &str = "kubernetes.io/service-name";

/// When present on an endpoint slice, its listeners are not required by the cluster.
pub const OPTIONAL: &str = "optional";

/// Marks objects created by this tool so they can be found and removed.
pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";

pub const MANAGED_BY_VALUE: &str = "commatrix";
