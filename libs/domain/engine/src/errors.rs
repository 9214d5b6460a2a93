// [libs/domain/engine/src/errors.rs]
/*!
 * =================================================================
 * APARATO: ENGINE ERROR CATALOG (C6+C7+C8+C9 / C11)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: TAXONOMÍA DE FALLOS DEL NÚCLEO OPERATIVO
 *
 * Envuelve los catálogos de sus dos dependencias (`StoreError`,
 * `TransportError`) en lugar de aplanarlos, para que un llamador
 * pueda seguir distinguiendo un fallo de persistencia de un fallo de
 * transporte sin downcasting (§7).
 * =================================================================
 */

use aether_infra_store::StoreError;
use aether_infra_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("[ENGINE_STORE]: {0}")]
    Store(#[from] StoreError),

    #[error("[ENGINE_TRANSPORT]: {0}")]
    Transport(#[from] TransportError),

    #[error("[ENGINE_UNEXPECTED_PAYLOAD]: agent replied with a payload shape the caller did not request -> {0}")]
    UnexpectedPayload(&'static str),

    #[error("[ENGINE_NOT_FOUND]: no System is registered under id '{0}'")]
    SystemNotFound(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
