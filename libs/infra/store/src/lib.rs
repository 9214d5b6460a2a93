// [libs/infra/store/src/lib.rs]
/*!
 * =================================================================
 * APARATO: RECORD STORE ADAPTER (C1)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA ACID DEL NÚCLEO DE FLOTA SOBRE LIBSQL
 *
 * Única frontera del workspace que conoce libSQL (§9). El resto del
 * árbol programa contra el trait `RecordStore` expuesto aquí.
 * =================================================================
 */

pub mod client;
pub mod contract;
pub mod errors;
pub mod libsql_adapter;
pub mod schema;
pub mod secrets;

pub use client::StoreClient;
pub use contract::{PersistedSample, RecordStore};
pub use errors::{StoreError, StoreResult};
pub use libsql_adapter::LibsqlRecordStore;
pub use schema::apply_core_schema;
pub use secrets::DataCleanupSecretCodec;

#[cfg(test)]
mod tests {
    use super::*;
    use aether_domain_models::{FetchedSystemData, System, SystemInfo, SystemStatus};
    use chrono::Utc;

    async fn memory_store() -> LibsqlRecordStore {
        let client = StoreClient::connect("file::memory:?cache=shared", None)
            .await
            .expect("in-memory record store should ignite");
        LibsqlRecordStore::new(client)
    }

    fn sample_system(id: &str) -> System {
        System {
            id: id.to_string(),
            name: "edge-01".into(),
            host: "10.0.0.5".into(),
            port: 45820,
            status: SystemStatus::Pending,
            users: vec!["root".into()],
            info: SystemInfo::default(),
            updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_find_round_trips_a_system() {
        let store = memory_store().await;
        let system = sample_system("sys-1");
        store.save_system(&system).await.expect("save should succeed");

        let found = store.find_system("sys-1").await.expect("find should succeed");
        assert!(found.is_some());
        assert_eq!(found.unwrap().host, "10.0.0.5");
    }

    #[tokio::test]
    async fn persist_sample_marks_system_up_and_advances_updated() {
        let store = memory_store().await;
        let mut system = sample_system("sys-2");
        system.status = SystemStatus::Pending;
        store.save_system(&system).await.expect("save should succeed");

        let now = Utc::now();
        let data = FetchedSystemData::default();
        let persisted = store
            .persist_sample("sys-2", &data, now)
            .await
            .expect("persist_sample should succeed");

        assert_eq!(persisted.system.status, SystemStatus::Up);
        assert!(persisted.system.updated >= system.updated);
    }

    #[tokio::test]
    async fn delete_system_removes_the_row() {
        let store = memory_store().await;
        let system = sample_system("sys-3");
        store.save_system(&system).await.expect("save should succeed");
        store.delete_system("sys-3").await.expect("delete should succeed");

        let found = store.find_system("sys-3").await.expect("find should succeed");
        assert!(found.is_none());
    }
}
