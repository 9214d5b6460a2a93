// [libs/infra/transport/src/ssh.rs]
/*!
 * =================================================================
 * APARATO: SSH DIALER (C3)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: SESIÓN-POR-LLAMADA SOBRE UN CLIENTE SSH CACHEADO
 *                   POR ENDPOINT (TCP O UNIX SOCKET), CON REINTENTO
 *                   AL EXPIRAR EL DIAL
 *
 * Una sesión exec se abre, ejecuta el comando del agente, escribe el
 * frame de petición en su stdin, lee exactamente un frame de respuesta
 * de su stdout, y se cierra — pero el `Handle` SSH autenticado que la
 * porta se cachea por `(host, port)` y se reutiliza entre llamadas
 * (§4.3: "If the SSH client is missing or the System was down, a
 * fresh client is dialled… a timeout closes the cached client and
 * retries up to `retries` times"). El dial en sí está timeboxed por
 * separado del presupuesto de la llamada RPC que lo envuelve. `host`
 * es un hostname ordinario o, cuando empieza con `/`, la ruta
 * absoluta a un socket Unix del propio Agente (§3); ambos casos se
 * resuelven al mismo `Handle` autenticado una vez dentro de
 * `handshake`.
 * =================================================================
 */

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle, Handler};
use russh_keys::key::PublicKey;
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::codec::MAX_FRAME_BYTES;
use crate::errors::{CodecError, TransportError, TransportResult};
use crate::version::parse_agent_version;

/// Comando remoto que el agente expone para una llamada RPC enmarcada.
/// Acordado fuera de banda con el binario del agente.
const AGENT_EXEC_COMMAND: &str = "aether-agent rpc";

/// Número de reintentos por defecto cuando el dial o la apertura de
/// sesión sobre un cliente cacheado expira (§4.3, default 1).
pub const DEFAULT_SSH_RETRIES: usize = 1;

/// Presupuesto propio de la creación de sesión (dial + apertura de
/// canal), independiente del deadline que C5 impone a la llamada RPC
/// completa (§4.3 "Session creation itself is timeboxed").
const SESSION_CREATION_TIMEOUT: Duration = Duration::from_secs(10);

struct TrustOnFirstUse;

impl Handler for TrustOnFirstUse {
    type Error = russh::Error;

    /// La flota de agentes vive detrás de un canal de aprovisionamiento
    /// ya autenticado (claves pre-distribuidas); no hay un almacén de
    /// `known_hosts` que consultar aquí.
    async fn check_server_key(self, _server_public_key: &PublicKey) -> Result<(Self, bool), Self::Error> {
        Ok((self, true))
    }
}

/// Credencial de autenticación para el dial SSH, independiente del
/// transporte: clave privada en memoria, nunca tocada desde disco por
/// este módulo (la carga de archivo es responsabilidad de quien
/// construye el `SshDialer`).
#[derive(Clone)]
pub struct SshCredential {
    pub username: String,
    pub key_pair: Arc<russh_keys::key::KeyPair>,
}

/// Cliente SSH autenticado cacheado para un endpoint: el `Handle` se
/// reutiliza entre llamadas (`channel_open_session` toma `&self`, una
/// conexión autenticada soporta muchos canales), sólo la autenticación
/// se paga una vez por dial.
struct CachedClient {
    handle: Handle<TrustOnFirstUse>,
    banner: Option<String>,
}

/// Dialer de sesiones SSH exec, una por llamada RPC, sobre un cliente
/// autenticado cacheado por `(host, port)` (§4.3 "Correlación (SSH)").
#[derive(Clone)]
pub struct SshDialer {
    credential: SshCredential,
    retries: usize,
    clients: Arc<Mutex<HashMap<String, Arc<Mutex<Option<CachedClient>>>>>>,
}

impl SshDialer {
    pub fn new(credential: SshCredential) -> Self {
        Self::with_retries(credential, DEFAULT_SSH_RETRIES)
    }

    pub fn with_retries(credential: SshCredential, retries: usize) -> Self {
        Self { credential, retries, clients: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Slot de cliente cacheado para este endpoint, creándolo vacío si
    /// es la primera vez que se marca. Un `Mutex` por endpoint en vez
    /// de uno global: llamadas concurrentes a Systems distintos no se
    /// bloquean entre sí.
    async fn slot_for(&self, host: &str, port: u16) -> Arc<Mutex<Option<CachedClient>>> {
        let key = format!("{host}:{port}");
        let mut clients = self.clients.lock().await;
        clients.entry(key).or_insert_with(|| Arc::new(Mutex::new(None))).clone()
    }

    /// Abre la conexión subyacente (TCP, o Unix domain socket cuando
    /// `host` es una ruta absoluta, §3 "host: hostname or absolute path
    /// to a Unix socket"), completa la negociación SSH, autentica, y
    /// devuelve el cliente autenticado junto al banner de versión crudo
    /// anunciado por el servidor.
    async fn handshake(&self, host: &str, port: u16) -> TransportResult<CachedClient> {
        let config = Arc::new(client::Config::default());

        let mut handle = if host.starts_with('/') {
            let stream = UnixStream::connect(host)
                .await
                .map_err(|e| TransportError::SshDial { host: host.to_string(), port, source: e.to_string() })?;

            client::connect_stream(config, stream, TrustOnFirstUse)
                .await
                .map_err(|e| TransportError::SshDial { host: host.to_string(), port, source: e.to_string() })?
        } else {
            let addr = format!("{host}:{port}");
            let stream = TcpStream::connect(&addr)
                .await
                .map_err(|e| TransportError::SshDial { host: host.to_string(), port, source: e.to_string() })?;

            client::connect_stream(config, stream, TrustOnFirstUse)
                .await
                .map_err(|e| TransportError::SshDial { host: host.to_string(), port, source: e.to_string() })?
        };

        let banner = handle.server_banner().map(|b| b.to_string());

        let authenticated = handle
            .authenticate_publickey(&self.credential.username, self.credential.key_pair.clone())
            .await
            .map_err(|e| TransportError::SshDial { host: host.to_string(), port, source: e.to_string() })?;

        if !authenticated {
            return Err(TransportError::SshDial {
                host: host.to_string(),
                port,
                source: "public key authentication rejected".into(),
            });
        }

        Ok(CachedClient { handle, banner })
    }

    /// Garantiza un cliente en `slot`, dialando uno fresco si falta o
    /// si una vuelta anterior lo vació tras expirar (§4.3). El propio
    /// dial está timeboxed por `SESSION_CREATION_TIMEOUT`; su expiración
    /// cuenta contra `retries` igual que la apertura de sesión.
    async fn ensure_client<'a>(
        &self,
        slot: &'a mut Option<CachedClient>,
        host: &str,
        port: u16,
    ) -> TransportResult<&'a mut CachedClient> {
        if slot.is_none() {
            let dialed = timeout(SESSION_CREATION_TIMEOUT, self.handshake(host, port))
                .await
                .map_err(|_| TransportError::Timeout { budget_ms: SESSION_CREATION_TIMEOUT.as_millis() as u64 })??;
            *slot = Some(dialed);
        }

        Ok(slot.as_mut().expect("slot populated above"))
    }

    /// Versión del agente parseada a partir de su banner SSH, sin
    /// ejecutar ningún comando (usado para la negociación de §4.3
    /// antes de decidir la forma del frame). Reutiliza el cliente
    /// cacheado del endpoint si ya hay uno.
    pub async fn probe_version(&self, host: &str, port: u16) -> TransportResult<Option<(u32, u32, u32)>> {
        let slot = self.slot_for(host, port).await;
        let mut guard = slot.lock().await;
        let client = self.ensure_client(&mut guard, host, port).await?;
        Ok(client.banner.as_deref().and_then(parse_agent_version))
    }

    /// Abre una sesión sobre el cliente cacheado de este endpoint,
    /// ejecuta exactamente una llamada RPC enmarcada, y la cierra.
    /// `raw_request` ya viene codificado (framed o legado) por el
    /// llamador (C5), que decide la forma según la versión negociada.
    ///
    /// Si el dial o la apertura de sesión expiran, el cliente cacheado
    /// se cierra y se reintenta con uno fresco hasta `retries` veces
    /// (§4.3, default 1).
    pub async fn call(&self, host: &str, port: u16, raw_request: &[u8]) -> TransportResult<Vec<u8>> {
        let slot = self.slot_for(host, port).await;
        let mut guard = slot.lock().await;
        let mut attempts_left = self.retries + 1;

        loop {
            let client = self.ensure_client(&mut guard, host, port).await?;

            match timeout(SESSION_CREATION_TIMEOUT, Self::exec_once(client, host, port, raw_request)).await {
                Ok(result) => return result,
                Err(_) => {
                    debug!(host, port, "🔁 [SSH_DIALER]: session creation timed out, closing cached client and retrying");
                    *guard = None;
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        return Err(TransportError::Timeout { budget_ms: SESSION_CREATION_TIMEOUT.as_millis() as u64 });
                    }
                }
            }
        }
    }

    /// Una única sesión exec sobre un cliente ya autenticado: abre el
    /// canal, ejecuta el comando del agente, escribe la petición,
    /// cierra stdin, y acumula la respuesta hasta EOF/cierre.
    async fn exec_once(client: &CachedClient, host: &str, port: u16, raw_request: &[u8]) -> TransportResult<Vec<u8>> {
        let mut channel = client
            .handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::SshDial { host: host.to_string(), port, source: e.to_string() })?;

        channel
            .exec(true, AGENT_EXEC_COMMAND)
            .await
            .map_err(|e| TransportError::SshDial { host: host.to_string(), port, source: e.to_string() })?;

        channel
            .data(&mut Cursor::new(raw_request))
            .await
            .map_err(|e| TransportError::WsSendFailure(e.to_string()))?;
        channel.eof().await.map_err(|e| TransportError::WsSendFailure(e.to_string()))?;

        let mut response = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { data } => {
                    response.extend_from_slice(&data);
                    if response.len() > MAX_FRAME_BYTES {
                        return Err(TransportError::WsDecodeFailure(CodecError::FrameTooLarge {
                            size: response.len(),
                            limit: MAX_FRAME_BYTES,
                        }));
                    }
                }
                russh::ChannelMsg::Eof | russh::ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retries_constant_matches_spec_default() {
        assert_eq!(DEFAULT_SSH_RETRIES, 1);
    }

    #[tokio::test]
    async fn slot_for_returns_the_same_slot_for_the_same_endpoint() {
        let credential = SshCredential {
            username: "aether".into(),
            key_pair: Arc::new(russh_keys::key::KeyPair::generate_ed25519().expect("keygen")),
        };
        let dialer = SshDialer::new(credential);

        let a = dialer.slot_for("10.0.0.5", 22).await;
        let b = dialer.slot_for("10.0.0.5", 22).await;
        assert!(Arc::ptr_eq(&a, &b));

        let c = dialer.slot_for("10.0.0.6", 22).await;
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn an_absolute_host_path_dials_a_unix_socket_instead_of_tcp() {
        let credential = SshCredential {
            username: "aether".into(),
            key_pair: Arc::new(russh_keys::key::KeyPair::generate_ed25519().expect("keygen")),
        };
        let dialer = SshDialer::new(credential);

        let err = dialer
            .handshake("/run/aether-agent-does-not-exist.sock", 0)
            .await
            .expect_err("no socket is listening at this path");

        match err {
            TransportError::SshDial { host, .. } => assert_eq!(host, "/run/aether-agent-does-not-exist.sock"),
            other => panic!("expected SshDial, got {other:?}"),
        }
    }
}
