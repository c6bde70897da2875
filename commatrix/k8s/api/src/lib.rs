#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
mod roles;

pub use self::roles::node_roles;
pub use k8s_openapi::api::{
    self,
    core::v1::{Namespace, Node, ObjectReference, Pod, PodSpec, Service, ServiceSpec},
    discovery::v1::{Endpoint, EndpointPort, EndpointSlice},
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
pub use kube::api::{ObjectMeta, ResourceExt};
