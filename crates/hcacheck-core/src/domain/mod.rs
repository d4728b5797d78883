//! Domain types shared by every layer.

mod adapter;
mod check;
mod gateway;
mod spec;

pub use adapter::{
    AdapterIdentity, AdapterState, CounterMap, InfinibandSnapshot, LinkLayer, NicRole,
    PciFunction, SoftwareState,
};
pub use check::{CheckLevel, CheckReport, CheckResult, CheckStatus};
pub use gateway::{GatewayResolution, NoGatewayReason};
pub use spec::{
    AdapterSpec, ClusterSpec, DEFAULT_CLUSTER, HCA_COMPONENT, HardwareSpec, INFINIBAND_COMPONENT,
    PerfSpec, ResolvedSpec, SoftwareDeps, SpecDocument, SpecLoadError,
};
