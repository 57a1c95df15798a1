//! Typed access to the legacy tunnel, container and port-mapping trees.
//!
//! These records are only kept around until they have been migrated, so the
//! accessor mostly reads and deletes. Every call opens its own handle.

use std::collections::BTreeMap;

use agentdb_bucket_store::{Bucket, BucketStore, Error as StoreError};

use crate::config::Config;
use crate::error::Error;
use crate::port_map::{PortMapping, Protocol};

pub const SSH_TUNNELS: &str = "sshtunnels";
pub const CONTAINERS: &str = "containers";
pub const PORT_MAP: &str = "portmap";

/// Field injected into every tunnel record, holding the bucket name.
pub const PID_FIELD: &str = "pid";

/// Buckets counted by `stats()` that are not remaining mappings.
const BOOKKEEPING_BUCKETS: usize = 2;

/// Flat field mapping of a single record.
pub type Record = BTreeMap<String, String>;

/// Accessor for the agent's store file.
///
/// Construct one at startup and share it by reference. It holds no open
/// handle, so it is cheap to clone and safe to use from several threads;
/// concurrent writers are serialized by the store's file lock.
#[derive(Debug, Clone)]
pub struct AgentDb {
    store: BucketStore,
}

impl AgentDb {
    pub fn new(config: &Config) -> Self {
        Self {
            store: BucketStore::new(config.db_path(), config.open_options()),
        }
    }

    pub fn store(&self) -> &BucketStore {
        &self.store
    }

    /// Delete the tunnel record for `pid`. Absent records are ignored.
    pub fn delete_tunnel_entry(&self, pid: &str) -> Result<(), Error> {
        self.store.update(|tx| {
            if let Some(mut tunnels) = tx.bucket_mut(SSH_TUNNELS)? {
                if tunnels.delete_bucket(pid)? {
                    log::debug!("Deleted tunnel entry {}", pid);
                }
            }
            Ok(())
        })
    }

    /// Every tunnel record, each with a `pid` field naming its bucket.
    pub fn list_tunnels(&self) -> Result<Vec<Record>, Error> {
        self.store.view(|tx| {
            let Some(tunnels) = tx.bucket(SSH_TUNNELS)? else {
                return Ok(Vec::new());
            };
            tunnels
                .children()?
                .iter()
                .map(|tunnel| -> Result<Record, Error> {
                    let mut record = tunnel.fields()?;
                    record.insert(PID_FIELD.to_string(), tunnel.name().to_string());
                    Ok(record)
                })
                .collect()
        })
    }

    /// Delete the container record `name`. Absent records are ignored.
    pub fn remove_container(&self, name: &str) -> Result<(), Error> {
        self.store.update(|tx| {
            if let Some(mut containers) = tx.bucket_mut(CONTAINERS)? {
                if containers.delete_bucket(name)? {
                    log::debug!("Removed container {}", name);
                }
            }
            Ok(())
        })
    }

    /// Names of all container records.
    pub fn list_containers(&self) -> Result<Vec<String>, Error> {
        self.store.view(|tx| match tx.bucket(CONTAINERS)? {
            Some(containers) => Ok(containers.buckets()?),
            None => Ok(Vec::new()),
        })
    }

    /// Fields of the container record `name`, empty if there is none.
    pub fn get_container_by_name(&self, name: &str) -> Result<Record, Error> {
        self.store
            .view(|tx| match tx.bucket_at(&[CONTAINERS, name])? {
                Some(container) => Ok(container.fields()?),
                None => Ok(Record::new()),
            })
    }

    /// All mappings recorded for `protocol`.
    ///
    /// Only complete chains count: plain keys at any level are skipped.
    pub fn list_port_mappings(&self, protocol: Protocol) -> Result<Vec<PortMapping>, Error> {
        self.store.view(|tx| {
            let mut list = Vec::new();
            let Some(by_protocol) = tx.bucket_at(&[PORT_MAP, protocol.as_str()])? else {
                return Ok(list);
            };

            for external in by_protocol.children()? {
                if protocol.has_domain() {
                    for domain in external.children()? {
                        push_leaves(&mut list, protocol, &external, &domain, Some(domain.name()))?;
                    }
                } else {
                    push_leaves(&mut list, protocol, &external, &external, None)?;
                }
            }
            Ok(list)
        })
    }

    /// Delete the deepest level named by the arguments.
    ///
    /// An empty `domain` deletes everything under `external`; otherwise an
    /// empty `internal` deletes everything under `domain`; otherwise only
    /// the `internal` leaf goes. Returns a rough count of what is left next
    /// to the deleted bucket: only zero versus non-zero is meaningful.
    pub fn delete_port_mapping(
        &self,
        protocol: Protocol,
        external: &str,
        domain: &str,
        internal: &str,
    ) -> Result<usize, Error> {
        let (parent, target) = if domain.is_empty() {
            (vec![PORT_MAP, protocol.as_str()], external)
        } else if internal.is_empty() {
            (vec![PORT_MAP, protocol.as_str(), external], domain)
        } else {
            (vec![PORT_MAP, protocol.as_str(), external, domain], internal)
        };

        self.store.update(|tx| {
            let Some(mut bucket) = tx.bucket_mut_at(&parent)? else {
                return Ok(0);
            };
            match bucket.delete_bucket(target) {
                Ok(_) => {}
                Err(StoreError::IncompatibleValue { path }) => {
                    log::debug!("Not deleting {}: not a mapping bucket", path);
                }
                Err(err) => return Err(err.into()),
            }
            Ok(bucket.stats()?.bucket_n.saturating_sub(BOOKKEEPING_BUCKETS))
        })
    }

    /// Whether the chain named by the non-empty arguments exists.
    ///
    /// An empty `domain` stops the check at `external`, whatever `internal`
    /// holds.
    pub fn is_port_mapped(
        &self,
        protocol: Protocol,
        external: &str,
        domain: &str,
        internal: &str,
    ) -> Result<bool, Error> {
        let mut names = vec![PORT_MAP, protocol.as_str(), external];
        if !domain.is_empty() {
            names.push(domain);
            if !internal.is_empty() {
                names.push(internal);
            }
        }

        self.store
            .view(|tx| Ok(tx.bucket_at(&names)?.is_some()))
    }

    /// Create or extend the tunnel record for `pid`.
    pub fn save_tunnel<K, V>(
        &self,
        pid: &str,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), Error>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.save_record(SSH_TUNNELS, pid, fields)
    }

    /// Create or extend the container record `name`.
    pub fn save_container<K, V>(
        &self,
        name: &str,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), Error>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.save_record(CONTAINERS, name, fields)
    }

    /// Record `mapping`, creating every missing level of its chain.
    pub fn add_port_mapping(&self, mapping: &PortMapping) -> Result<(), Error> {
        let domain = match (&mapping.domain, mapping.protocol.has_domain()) {
            (Some(domain), true) if !domain.is_empty() => Some(domain.as_str()),
            (None, false) => None,
            (_, true) => {
                return Err(Error::InvalidMapping {
                    message: format!("{} mappings need a domain", mapping.protocol),
                })
            }
            (Some(_), false) => {
                return Err(Error::InvalidMapping {
                    message: format!("{} mappings cannot have a domain", mapping.protocol),
                })
            }
        };

        self.store.update(|tx| {
            let mut portmap = tx.create_bucket_if_not_exists(PORT_MAP)?;
            let mut by_protocol = portmap.create_bucket_if_not_exists(mapping.protocol.as_str())?;
            let mut external = by_protocol.create_bucket_if_not_exists(&mapping.external_socket)?;
            match domain {
                Some(domain) => {
                    external
                        .create_bucket_if_not_exists(domain)?
                        .create_bucket_if_not_exists(&mapping.internal_socket)?;
                }
                None => {
                    external.create_bucket_if_not_exists(&mapping.internal_socket)?;
                }
            }
            Ok(())
        })
    }

    fn save_record<K, V>(
        &self,
        tree: &str,
        name: &str,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), Error>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.store.update(|tx| {
            let mut top = tx.create_bucket_if_not_exists(tree)?;
            let mut record = top.create_bucket_if_not_exists(name)?;
            for (key, value) in fields {
                record.put(key.as_ref(), value.as_ref())?;
            }
            Ok(())
        })
    }
}

/// Push one mapping per child bucket of `parent`.
fn push_leaves(
    list: &mut Vec<PortMapping>,
    protocol: Protocol,
    external: &Bucket<'_>,
    parent: &Bucket<'_>,
    domain: Option<&str>,
) -> Result<(), StoreError> {
    for internal in parent.buckets()? {
        list.push(PortMapping {
            protocol,
            external_socket: external.name().to_string(),
            internal_socket: internal,
            domain: domain.map(str::to_string),
        });
    }
    Ok(())
}
