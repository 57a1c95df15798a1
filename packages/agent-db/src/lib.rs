//! Data access for the agent's persisted operational state.
//!
//! Three trees live in one store file at `<data-prefix>/agent.db`:
//!
//! ```text
//! sshtunnels/<pid>/{field: value}
//! containers/<name>/{field: value}
//! portmap/<protocol>/<external>/<internal>           # tcp, udp
//! portmap/<protocol>/<external>/<domain>/<internal>  # http, https
//! ```
//!
//! Missing buckets anywhere along a path mean "nothing recorded" and never
//! produce an error. Only failures to open the store or run a transaction
//! are reported.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentdb::{AgentDb, Config, Protocol};
//!
//! let db = AgentDb::new(&Config::from_env());
//! for mapping in db.list_port_mappings(Protocol::Http)? {
//!     println!("{:?}", mapping);
//! }
//! db.delete_port_mapping(Protocol::Tcp, "0.0.0.0:2222", "", "")?;
//! # Ok::<(), agentdb::Error>(())
//! ```

mod config;
mod db;
mod error;
mod port_map;

pub use config::{Config, DATA_PREFIX_ENV, DB_FILE_NAME};
pub use db::{AgentDb, Record, CONTAINERS, PID_FIELD, PORT_MAP, SSH_TUNNELS};
pub use error::Error;
pub use port_map::{ParseProtocolError, PortMapping, Protocol};

pub use agentdb_bucket_store as bucket_store;
