// Kubelet-facing gRPC surface: the DevicePlugin service and the unix socket
// server plus registration client around it.

pub mod device_plugin;
pub mod server;
