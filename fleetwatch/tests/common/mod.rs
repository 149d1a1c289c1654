#![allow(dead_code)]

use std::path::PathBuf;

use fleetwatch::control_url::AccessPoint;
use fleetwatch::model::{Daemon, DaemonName};
use fleetwatch::store::app::{add_app, add_daemon};
use fleetwatch::store::{Store, StoreConfig};
use tempfile::TempDir;

pub fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

pub fn temp_store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(StoreConfig::at(dir.path().join("state.sqlite3"))).expect("store");
    (dir, store)
}

/// Register an app at `address:8000` hosting one daemon of kind `name`.
pub fn register(store: &Store, app: &str, address: &str, name: DaemonName) -> Daemon {
    store
        .transaction(|tx| {
            let app = add_app(tx, app, &AccessPoint::new(address, 8000, false))?;
            add_daemon(tx, app.id, name)
        })
        .expect("register daemon")
}

/// DHCPv4 configuration of one member of the `server1`/`server2`/`server4`
/// load-balancing setup.
pub fn ha_config(this_server: &str, log_file: &str) -> String {
    format!(
        r#"{{"Dhcp4": {{
            "hooks-libraries": [{{
                "library": "/usr/lib/kea/hooks/libdhcp_ha.so",
                "parameters": {{"high-availability": [{{
                    "this-server-name": "{this_server}",
                    "mode": "load-balancing",
                    "peers": [
                        {{"name": "server1", "url": "http://192.0.2.33:8000/", "role": "primary"}},
                        {{"name": "server2", "url": "http://192.0.2.66:8000/", "role": "secondary"}},
                        {{"name": "server4", "url": "http://192.0.2.133:8000/", "role": "backup"}}
                    ]
                }}]}}
            }}],
            "loggers": [{{
                "name": "kea-dhcp4",
                "severity": "INFO",
                "output_options": [{{"output": "{log_file}"}}, {{"output": "stdout"}}]
            }}]
        }}}}"#
    )
}
