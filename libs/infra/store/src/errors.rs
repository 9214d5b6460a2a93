// [libs/infra/store/src/errors.rs]
/*!
 * =================================================================
 * APARATO: RECORD STORE ERROR CATALOG (C1 / C11)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * Catálogo por clase de fallo, no por tipo físico, en línea con la
 * taxonomía de errores del núcleo (§7): persistencia, configuración,
 * conflicto de concurrencia, estado inválido.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Error de enlace físico o de red con el backend de persistencia.
    #[error("[STORE_CONNECTION]: record store uplink severed -> {0}")]
    Connection(String),

    /// Fallo en la configuración de conexión (URL vacía, token ausente).
    #[error("[STORE_CONFIG]: {0}")]
    Configuration(String),

    /// Error de sintaxis o ejecución devuelto por el motor subyacente.
    #[error("[STORE_QUERY]: query rejected -> {0}")]
    Query(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre filas y el dominio Rust.
    #[error("[STORE_MAPPING]: mapping violation -> {0}")]
    Mapping(String),

    /// Aborto de una transacción multi-fila (§4.2.1).
    #[error("[STORE_TRANSACTION]: transaction aborted -> {0}")]
    Transaction(String),

    /// La fila solicitada no existe en la colección.
    #[error("[STORE_NOT_FOUND]: record not found in collection '{collection}'")]
    NotFound { collection: &'static str },

    /// Conflicto de concurrencia sobre una fila (escritura concurrente
    /// de un campo que debería tener un único escritor).
    #[error("[STORE_CONFLICT]: ownership conflict on '{0}'")]
    OwnershipConflict(String),

    /// La fila no está en un estado apto para la operación solicitada.
    #[error("[STORE_STATE]: invalid state transition -> {0}")]
    InvalidState(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
