//! Driving complete alignment runs over a [`Transport`].
//!
//! A run starts with the init exchange: the client announces its
//! parameters and set size, the server checks the parameters against its
//! own and picks roles from both sizes. The chosen curve and role then
//! select which session type drives the remaining rounds.

use crate::bucket;
use crate::config::PsiConfig;
use crate::context::{CurveName, ProtocolContext, Role};
use crate::crypto::{Curve, Ristretto255, Secp256k1};
use crate::error::{ConfigError, PsiError, Result};
use crate::messages::{AliceCheck, BobAlignResult, ClientInit, ServerInit};
use crate::state::{AliceState, AlignmentResult, BobState};
use crate::transport::{InMemoryTransport, Transport};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

/// Side of the connection, independent of the alignment role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommRole {
    Client,
    Server,
}

impl CommRole {
    pub fn as_str(self) -> &'static str {
        match self {
            CommRole::Client => "client",
            CommRole::Server => "server",
        }
    }
}

impl fmt::Display for CommRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "client" => Ok(CommRole::Client),
            "server" => Ok(CommRole::Server),
            other => Err(ConfigError::UnknownCommRole(other.to_string())),
        }
    }
}

/// Align `items` with the peer behind `transport` as batch `batch_id`.
///
/// # Errors
/// - `PsiError::EmptyInput` if `items` is empty
/// - `PsiError::Config` if the configuration is invalid, before anything is sent
/// - `PsiError::ProtocolViolation` if the peer disagrees on parameters or
///   sends a malformed message
/// - `PsiError::Transport` if the peer goes away
pub fn run_psi<T: Transport>(
    config: &PsiConfig,
    items: &[Vec<u8>],
    comm_role: CommRole,
    batch_id: u64,
    transport: &mut T,
) -> Result<AlignmentResult> {
    if items.is_empty() {
        return Err(PsiError::EmptyInput);
    }
    align_batch(config, items, comm_role, batch_id, transport)
}

/// Partition `items` into `config.bucket_num` buckets and align them one
/// by one, returning the concatenated intersection in bucket order.
///
/// A bucket that is empty on either side is announced with a zero count
/// in the init exchange and contributes nothing to the result.
pub fn run_bucketed<T: Transport>(
    config: &PsiConfig,
    items: &[Vec<u8>],
    comm_role: CommRole,
    transport: &mut T,
) -> Result<Vec<Vec<u8>>> {
    let buckets = bucket::partition(items, config.bucket_num)?;
    let mut intersection = Vec::new();
    for (index, keys) in buckets.iter().enumerate() {
        let batch_id = index as u64 + 1;
        let result = align_batch(config, keys, comm_role, batch_id, transport)?;
        intersection.extend(result.intersection);
    }
    Ok(intersection)
}

/// Outcome of the init exchange.
enum Handshake {
    Run(ProtocolContext),
    /// One side has no items in this batch.
    Skip,
}

fn align_batch<T: Transport>(
    config: &PsiConfig,
    items: &[Vec<u8>],
    comm_role: CommRole,
    batch_id: u64,
    transport: &mut T,
) -> Result<AlignmentResult> {
    let ctx = ProtocolContext::from_config(config, items.len(), batch_id);
    if items.is_empty() {
        ctx.validate_parameters()?;
    } else {
        ctx.validate_local()?;
    }

    let start = Instant::now();
    let handshake = match comm_role {
        CommRole::Client => client_handshake(ctx, transport)?,
        CommRole::Server => server_handshake(ctx, transport)?,
    };
    let ctx = match handshake {
        Handshake::Run(ctx) => ctx,
        Handshake::Skip => {
            info!(batch_id, %comm_role, "batch is empty on one side, skipping");
            return Ok(AlignmentResult {
                intersection: Vec::new(),
                false_positive_count: 0,
            });
        }
    };

    let role = ctx.role;
    let result = match ctx.curve {
        CurveName::Ristretto255 => run_session::<Ristretto255, T>(ctx, items, transport)?,
        CurveName::Secp256k1 => run_session::<Secp256k1, T>(ctx, items, transport)?,
    };
    info!(
        batch_id,
        %role,
        %comm_role,
        intersection = result.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "alignment run complete"
    );
    Ok(result)
}

/// Run both sides in this process over an in-memory channel. The first set
/// plays the client.
///
/// Returns the results for `self_items` and `peer_items`, in that order.
pub fn run_local(
    self_items: &[Vec<u8>],
    peer_items: &[Vec<u8>],
    config: &PsiConfig,
) -> Result<(AlignmentResult, AlignmentResult)> {
    let (mut client, mut server) = InMemoryTransport::pair();
    thread::scope(|scope| {
        let peer =
            scope.spawn(move || run_psi(config, peer_items, CommRole::Server, 1, &mut server));
        let own = run_psi(config, self_items, CommRole::Client, 1, &mut client);
        drop(client);
        let peer = peer
            .join()
            .map_err(|_| PsiError::Transport("peer thread panicked".to_string()))?;
        Ok((own?, peer?))
    })
}

/// Non-private reference intersection: the items of `self_items` that also
/// occur in `peer_items`, in `self_items` order.
pub fn plain_intersection(self_items: &[Vec<u8>], peer_items: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let peer: HashSet<&[u8]> = peer_items.iter().map(Vec::as_slice).collect();
    self_items
        .iter()
        .filter(|item| peer.contains(item.as_slice()))
        .cloned()
        .collect()
}

fn client_handshake<T: Transport>(
    mut ctx: ProtocolContext,
    transport: &mut T,
) -> Result<Handshake> {
    transport.send(ClientInit::from_context(&ctx).into())?;
    let init: ServerInit = transport.expect()?;
    init.validate(&ctx)?;
    if ctx.self_count == 0 || init.self_count == 0 {
        return Ok(Handshake::Skip);
    }

    let expected = if init.self_count <= ctx.self_count {
        Role::Bob
    } else {
        Role::Alice
    };
    if init.self_role != expected {
        warn!(peer_role = %init.self_role, "peer role contradicts dataset sizes");
        return Err(PsiError::ProtocolViolation(format!(
            "peer with {} items took role {}, but {} has {} items",
            init.self_count,
            init.self_role,
            expected.complement(),
            ctx.self_count
        )));
    }
    ctx.assign_peer_role(init.self_role, init.self_count);
    Ok(Handshake::Run(ctx))
}

fn server_handshake<T: Transport>(
    mut ctx: ProtocolContext,
    transport: &mut T,
) -> Result<Handshake> {
    let init: ClientInit = transport.expect()?;
    if let Err(e) = init.validate(&ctx) {
        warn!("Rejected client init: {e}");
        return Err(e);
    }
    let skip = ctx.self_count == 0 || init.self_count == 0;
    if !skip {
        ctx.negotiate_role(init.self_count)?;
    }
    transport.send(
        ServerInit {
            batch_id: ctx.batch_id,
            self_count: ctx.self_count,
            self_role: ctx.role,
        }
        .into(),
    )?;
    Ok(if skip { Handshake::Skip } else { Handshake::Run(ctx) })
}

fn run_session<C: Curve, T: Transport>(
    ctx: ProtocolContext,
    items: &[Vec<u8>],
    transport: &mut T,
) -> Result<AlignmentResult> {
    match ctx.role {
        Role::Alice => run_alice::<C, T>(ctx, items, transport),
        Role::Bob => run_bob::<C, T>(ctx, items, transport),
    }
}

fn run_alice<C: Curve, T: Transport>(
    ctx: ProtocolContext,
    items: &[Vec<u8>],
    transport: &mut T,
) -> Result<AlignmentResult> {
    let state = AliceState::<C>::new(ctx, items)?;
    let (state, reply) = state.respond(transport.expect()?)?;
    transport.send(reply.into())?;

    let candidates: BobAlignResult = transport.expect()?;
    let (result, check) = state.check(candidates)?;
    if let Some(check) = check {
        transport.send(check.into())?;
    }
    Ok(result)
}

fn run_bob<C: Curve, T: Transport>(
    ctx: ProtocolContext,
    items: &[Vec<u8>],
    transport: &mut T,
) -> Result<AlignmentResult> {
    let verify = ctx.verify_results;
    let state = BobState::<C>::new(ctx, items)?;
    transport.send(state.points().into())?;

    let (state, candidates) = state.align(transport.expect()?)?;
    transport.send(candidates.into())?;
    if !verify {
        return Ok(state.into_result());
    }
    let check: AliceCheck = transport.expect()?;
    state.finish(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PsiVariant;
    use crate::messages::Message;

    fn ids(names: &[&str]) -> Vec<Vec<u8>> {
        names.iter().map(|name| name.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_comm_role_parsing() {
        assert_eq!("client".parse::<CommRole>().unwrap(), CommRole::Client);
        assert_eq!("server".parse::<CommRole>().unwrap(), CommRole::Server);
        assert_eq!(
            "peer".parse::<CommRole>(),
            Err(ConfigError::UnknownCommRole("peer".to_string()))
        );
    }

    #[test]
    fn test_plain_intersection() {
        let mine = ids(&["a", "b", "c", "d"]);
        let theirs = ids(&["d", "x", "b"]);
        assert_eq!(plain_intersection(&mine, &theirs), ids(&["b", "d"]));
        assert!(plain_intersection(&mine, &[]).is_empty());
    }

    #[test]
    fn test_run_local_matches_plain_intersection() {
        let mine = ids(&["a", "b", "c", "d", "e"]);
        let theirs = ids(&["e", "q", "b"]);
        let (own, peer) = run_local(&mine, &theirs, &PsiConfig::default()).unwrap();

        // The smaller set is bob's, so results follow its order.
        assert_eq!(own.intersection, plain_intersection(&theirs, &mine));
        assert_eq!(own.intersection, peer.intersection);
    }

    #[test]
    fn test_run_psi_rejects_empty_input() {
        let (mut client, _server) = InMemoryTransport::pair();
        let result = run_psi(&PsiConfig::default(), &[], CommRole::Client, 1, &mut client);
        assert_eq!(result, Err(PsiError::EmptyInput));
    }

    #[test]
    fn test_invalid_config_fails_before_sending() {
        let (mut client, mut server) = InMemoryTransport::pair();
        let config = PsiConfig {
            compare_len: 16,
            ..PsiConfig::default()
        };
        let result = run_psi(&config, &ids(&["a"]), CommRole::Client, 1, &mut client);
        assert!(matches!(result, Err(PsiError::Config(_))));

        drop(client);
        assert!(matches!(server.receive(), Err(PsiError::Transport(_))));
    }

    #[test]
    fn test_server_rejects_mismatched_variant() {
        let client_config = PsiConfig {
            psi_variant: PsiVariant::Ecdh,
            ..PsiConfig::default()
        };
        let (mut client, mut server) = InMemoryTransport::pair();
        client
            .send(
                ClientInit::from_context(&ProtocolContext::from_config(&client_config, 2, 1))
                    .into(),
            )
            .unwrap();

        let result = run_psi(
            &PsiConfig::default(),
            &ids(&["a", "b", "c"]),
            CommRole::Server,
            1,
            &mut server,
        );
        assert!(matches!(result, Err(PsiError::ProtocolViolation(_))));
    }

    #[test]
    fn test_client_rejects_inconsistent_server_role() {
        let (mut client, mut server) = InMemoryTransport::pair();
        server
            .send(Message::from(ServerInit {
                batch_id: 1,
                self_count: 10,
                self_role: Role::Bob,
            }))
            .unwrap();

        let result = run_psi(
            &PsiConfig::default(),
            &ids(&["a", "b"]),
            CommRole::Client,
            1,
            &mut client,
        );
        assert!(matches!(result, Err(PsiError::ProtocolViolation(_))));
    }

    #[test]
    fn test_bucketed_run_skips_empty_buckets() {
        let shared = ids(&["s1", "s2", "s3"]);
        let mut server_items = shared.clone();
        server_items.extend((0..17).map(|i| format!("server-{i}").into_bytes()));

        let config = PsiConfig {
            bucket_num: 4,
            ..PsiConfig::default()
        };
        let client_buckets = bucket::partition(&shared, config.bucket_num).unwrap();
        assert!(client_buckets.iter().any(Vec::is_empty));

        let (mut client, mut server) = InMemoryTransport::pair();
        let (client_result, server_result) = thread::scope(|scope| {
            let (config, server_items) = (&config, &server_items);
            let peer = scope
                .spawn(move || run_bucketed(config, server_items, CommRole::Server, &mut server));
            let own = run_bucketed(config, &shared, CommRole::Client, &mut client);
            drop(client);
            (own, peer.join().unwrap())
        });
        let client_result = client_result.unwrap();
        assert_eq!(client_result, server_result.unwrap());

        let found: HashSet<Vec<u8>> = client_result.into_iter().collect();
        let expected: HashSet<Vec<u8>> = shared.into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_empty_batch_is_announced_with_zero_count() {
        let (mut client, mut server) = InMemoryTransport::pair();
        let handle = thread::spawn(move || {
            align_batch(&PsiConfig::default(), &[], CommRole::Server, 3, &mut server)
        });
        let result = align_batch(
            &PsiConfig::default(),
            &ids(&["a", "b"]),
            CommRole::Client,
            3,
            &mut client,
        )
        .unwrap();

        assert!(result.is_empty());
        assert!(handle.join().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_server_hangup_is_transport_error() {
        let (mut client, server) = InMemoryTransport::pair();
        drop(server);
        let result = run_psi(
            &PsiConfig::default(),
            &ids(&["a"]),
            CommRole::Client,
            1,
            &mut client,
        );
        assert!(matches!(result, Err(PsiError::Transport(_))));
    }
}
