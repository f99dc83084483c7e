/// Contract Layer
///
/// Resolves the protocol's logical contract names through its on-chain
/// address resolver, installs descriptors with ABIs fetched from a
/// verification service, and exposes the typed reads and event queries the
/// sync engine needs through [`Synthetix`].
pub mod abi_source;
pub mod descriptor;
pub mod events;
pub mod names;
pub mod registry;
pub mod synthetix;

pub use abi_source::{AbiSource, EtherscanAbiSource};
pub use descriptor::ContractDescriptor;
pub use names::{ContractName, WatchedEvent};
pub use registry::{ContractRegistry, InstallReport};
pub use synthetix::Synthetix;
