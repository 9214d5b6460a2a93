// [apps/aether-hub/src/reconciler.rs]
/*!
 * =================================================================
 * APARATO: RECONCILIADOR DE INVENTARIO DE SYSTEMS
 * CLASIFICACIÓN: BACKGROUND SERVICE (ESTRATO L1-APP)
 * RESPONSABILIDAD: SINCRONIZACIÓN PERIÓDICA ENTRE EL REGISTRO
 *                   PERSISTIDO Y EL REGISTRO EN MEMORIA DEL MANAGER
 *
 * El registro de `RecordStore` no tiene un mecanismo de notificación
 * de cambios: un operador puede insertar o borrar una fila `systems`
 * por fuera de este proceso (otra herramienta de administración, una
 * migración manual) sin que el Manager (C7) se entere. Este daemon
 * cierra esa brecha con un barrido periódico de baja frecuencia.
 * =================================================================
 */

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use aether_domain_engine::SystemManager;
use aether_infra_store::RecordStore;

const RECONCILE_INTERVAL_SECONDS: u64 = 30;

pub fn spawn_reconciler(manager: Arc<SystemManager>, store: Arc<dyn RecordStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(RECONCILE_INTERVAL_SECONDS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            reconcile_once(&manager, store.as_ref()).await;
        }
    });
}

async fn reconcile_once(manager: &Arc<SystemManager>, store: &dyn RecordStore) {
    let persisted = match store.list_systems().await {
        Ok(systems) => systems,
        Err(e) => {
            warn!(error = %e, "⚠️ [RECONCILER]: failed to list persisted systems, skipping this round");
            return;
        }
    };

    let persisted_ids: HashSet<String> = persisted.iter().map(|s| s.id.clone()).collect();
    let registered_ids: HashSet<String> = manager.registered_ids().await.into_iter().collect();

    let mut added = 0usize;
    for system in persisted {
        if !registered_ids.contains(&system.id) {
            let id = system.id.clone();
            if let Err(e) = manager.add(system).await {
                warn!(system = %id, error = %e, "⚠️ [RECONCILER]: failed to register newly discovered system");
            } else {
                added += 1;
            }
        }
    }

    let mut removed = 0usize;
    for id in registered_ids.difference(&persisted_ids) {
        manager.remove(id).await;
        removed += 1;
    }

    if added > 0 || removed > 0 {
        info!(added, removed, "🔄 [RECONCILER]: registry synchronized against persisted inventory");
    } else {
        debug!("🔄 [RECONCILER]: registry already in sync");
    }
}
