//! Admission controller: decides which extra chunks enter the client world
//! and keeps the auxiliary connection alive for the length of a game session.
//!
//! The controller sits between three parties. Game lifecycle calls and
//! authoritative chunks arrive from the [`GameHost`]. [`ConnectionEvent`]s
//! arrive from the auxiliary link, usually through [`spawn_event_pump`].
//! Commands go out through [`AuxLink`]. World mutations are never done in
//! place; they are queued with [`GameHost::run_on_world_thread`].
//!
//! [`spawn_event_pump`]: AdmissionController::spawn_event_pump

use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Instant;

use chunkreach_chunk::Chunk;
use chunkreach_config::Config;
use chunkreach_coords::Pos2;
use chunkreach_net::{AuxLink, ConnectionEvent, DisconnectReason, ReconnectState};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::host::{GameChunkReceiver, GameHost};
use crate::planner::{self, Admission};

/// Per-session bookkeeping. Never held across host or link calls.
#[derive(Debug, Default)]
struct SessionState {
    backoff: ReconnectState,
    last_requested: Option<Pos2>,
    server_render_distance: i32,
}

/// Chunk admission and eviction for one game client.
pub struct AdmissionController<H: GameHost, L: AuxLink + 'static> {
    me: Weak<Self>,
    host: Arc<H>,
    link: L,
    config: RwLock<Config>,
    client_version: String,
    session: Mutex<SessionState>,
}

impl<H: GameHost, L: AuxLink + 'static> AdmissionController<H, L> {
    pub fn new(host: Arc<H>, link: L, config: Config, client_version: impl Into<String>) -> Arc<Self> {
        let client_version = client_version.into();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            host,
            link,
            config: RwLock::new(config),
            client_version,
            session: Mutex::new(SessionState::default()),
        })
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Config {
        self.config.read().unwrap().clone()
    }

    /// Render distance the current game server supplies itself.
    pub fn server_render_distance(&self) -> i32 {
        self.session.lock().unwrap().server_render_distance
    }

    /// Forward every event from `events` to the controller until the channel
    /// closes or the controller is dropped.
    pub fn spawn_event_pump(
        controller: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        runtime: &Handle,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(controller);
        runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.handle_event(event);
            }
            tracing::debug!("Connection event pump stopped");
        })
    }

    pub fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.on_auxiliary_connected(),
            ConnectionEvent::Disconnected(reason) => self.on_auxiliary_disconnected(reason),
            ConnectionEvent::ExtraChunk(chunk) => self.on_receive_extra_chunk(chunk),
            ConnectionEvent::StatusMessage(text) => self.on_status_message(&text),
        }
    }

    // -----------------------------------------------------------------------
    // Game lifecycle
    // -----------------------------------------------------------------------

    pub fn on_game_connected(&self) {
        if self.host.was_receiver_inserted() {
            tracing::debug!("Chunk receiver already installed for this session");
            return;
        }
        let receiver: Weak<dyn GameChunkReceiver> = self.me.clone();
        self.host.insert_chunk_receiver(receiver);
        self.session.lock().unwrap().last_requested = None;
        self.cache_server_render_distance();
        self.retry_connect(Instant::now());
    }

    pub fn on_game_disconnected(&self) {
        if self.link.is_connected() {
            self.link
                .disconnect(DisconnectReason::Expected("Game ending".to_string()));
        }
    }

    pub fn on_tick(&self) {
        self.on_tick_at(Instant::now());
    }

    /// [`Self::on_tick`] with an explicit clock.
    pub fn on_tick_at(&self, now: Instant) {
        self.retry_connect(now);
    }

    pub fn on_player_changed_dimension(&self, dimension: i32) {
        tracing::debug!(dimension, "Player changed dimension");
        self.link.send_player_dimension(dimension);
    }

    /// Apply new settings. Takes effect for the current session too.
    pub fn on_config_changed(&self, config: Config) {
        let chunks_per_second = config.stream.chunk_loads_per_second;
        *self.config.write().unwrap() = config;
        if self.host.is_ingame() {
            self.cache_server_render_distance();
        }
        if self.link.is_connected() {
            self.link.send_chunk_loads_per_second(chunks_per_second);
        }
    }

    fn cache_server_render_distance(&self) {
        let server_render_distance = self
            .host
            .current_server_address()
            .and_then(|address| {
                self.config
                    .read()
                    .unwrap()
                    .server_profile(&address)
                    .map(|profile| profile.server_render_distance)
            })
            .unwrap_or(0);
        self.session.lock().unwrap().server_render_distance = server_render_distance;
    }

    fn retry_connect(&self, now: Instant) {
        if self.link.is_connected() || !self.host.is_ingame() {
            return;
        }
        let Some(game_address) = self.host.current_server_address() else {
            tracing::error!("In game but the game server address is unknown");
            return;
        };

        let (delay, attempt) = {
            let mut session = self.session.lock().unwrap();
            if !session.backoff.ready(now) {
                return;
            }
            let delay = session.backoff.schedule(now);
            (delay, session.backoff.attempts())
        };

        let profile = self.config.read().unwrap().server_profile(&game_address).cloned();
        let Some(profile) = profile else {
            tracing::debug!(game = %game_address, "No chunk server configured");
            return;
        };
        tracing::info!(
            chunk_server = %profile.chunk_server_address,
            attempt,
            next_attempt_in = ?delay,
            "Connecting to chunk server"
        );
        self.link.connect(&profile.chunk_server_address);
    }

    // -----------------------------------------------------------------------
    // Auxiliary link
    // -----------------------------------------------------------------------

    pub fn on_auxiliary_connected(&self) {
        {
            // A fresh connection has seen no request yet.
            let mut session = self.session.lock().unwrap();
            session.backoff.reset();
            session.last_requested = None;
        }

        if !self.host.is_ingame() {
            self.link
                .disconnect(DisconnectReason::Expected("No game running".to_string()));
            return;
        }

        tracing::info!("Connected to chunk server");
        self.link
            .send_string_message(&format!("mod.version={}", self.client_version));
        let game_address = self.host.current_server_address().unwrap_or_default();
        self.link
            .send_string_message(&format!("game.address={game_address}"));
        self.link.send_player_dimension(self.host.player_dimension());
        let chunks_per_second = self.config.read().unwrap().stream.chunk_loads_per_second;
        self.link.send_chunk_loads_per_second(chunks_per_second);
    }

    pub fn on_auxiliary_disconnected(&self, reason: DisconnectReason) {
        if reason.is_expected() {
            tracing::debug!(%reason, "Chunk server connection closed");
            return;
        }
        // The next tick retries once the backoff allows it.
        tracing::warn!(reason = reason.message(), "Lost connection to chunk server");
    }

    pub fn on_status_message(&self, text: &str) {
        tracing::info!(message = text, "Chunk server status");
    }

    pub fn on_receive_extra_chunk(&self, chunk: Chunk) {
        if !self.host.is_ingame() {
            tracing::warn!(pos = %chunk.pos, "Extra chunk received while not in game");
            return;
        }

        let player = self.host.player_chunk_pos();
        let verdict = planner::classify_extra_chunk(
            chunk.pos,
            player,
            self.host.render_distance(),
            self.server_render_distance(),
        );
        match verdict {
            Admission::TooFar => {
                tracing::debug!(pos = %chunk.pos, %player, "Dropping extra chunk: too far");
            }
            Admission::TooClose => {
                tracing::debug!(pos = %chunk.pos, %player, "Dropping extra chunk: too close");
            }
            Admission::Accept => {
                let me = self.me.clone();
                self.host.run_on_world_thread(Box::new(move || {
                    let Some(me) = me.upgrade() else {
                        return;
                    };
                    me.host.unload_chunk(chunk.pos);
                    me.host.load_chunk(chunk);
                    me.evict_over_cap();
                }));
            }
        }
    }

    // -----------------------------------------------------------------------
    // World thread
    // -----------------------------------------------------------------------

    /// Ask the chunk server for the nearest missing chunks.
    pub fn request_extra_chunks(&self) {
        if !self.link.is_connected() {
            return;
        }
        let player = self.host.player_chunk_pos();
        let server_render_distance = {
            let session = self.session.lock().unwrap();
            if session.last_requested == Some(player) {
                return;
            }
            session.server_render_distance
        };

        let loaded = self.host.loaded_chunks();
        let cap = self.config.read().unwrap().stream.max_chunks_loaded;
        let limit = cap.saturating_sub(loaded.len());
        if limit == 0 {
            tracing::debug!(loaded = loaded.len(), cap, "At chunk cap, not requesting");
            return;
        }
        self.session.lock().unwrap().last_requested = Some(player);

        let positions = planner::request_candidates(
            player,
            self.host.render_distance(),
            server_render_distance,
            &loaded,
            limit,
        );
        if positions.is_empty() {
            return;
        }
        tracing::debug!(count = positions.len(), %player, "Requesting extra chunks");
        self.link.send_chunks_request(&positions);
    }

    /// Unload the furthest chunks until at most the configured cap remain.
    pub fn evict_over_cap(&self) {
        let loaded = self.host.loaded_chunks();
        let cap = self.config.read().unwrap().stream.max_chunks_loaded;
        let victims = planner::eviction_victims(loaded, self.host.player_chunk_pos(), cap);
        if victims.is_empty() {
            return;
        }
        tracing::debug!(count = victims.len(), cap, "Evicting chunks over cap");
        for pos in victims {
            self.host.unload_chunk(pos);
        }
    }

    /// Unload chunks the client can no longer see.
    pub fn prune_outside_render_distance(&self) {
        let outside = planner::outside_render_distance(
            self.host.loaded_chunks(),
            self.host.player_chunk_pos(),
            self.host.render_distance(),
        );
        for pos in outside {
            self.host.unload_chunk(pos);
        }
    }
}

impl<H: GameHost, L: AuxLink + 'static> GameChunkReceiver for AdmissionController<H, L> {
    fn on_receive_game_chunk(&self, chunk: Chunk) {
        if self.link.is_connected() {
            self.link.send_chunk(chunk.clone());
        }

        let me = self.me.clone();
        self.host.run_on_world_thread(Box::new(move || {
            let Some(me) = me.upgrade() else {
                return;
            };
            me.host.unload_chunk(chunk.pos);
            me.host.load_chunk(chunk);
            me.request_extra_chunks();
            me.prune_outside_render_distance();
            me.evict_over_cap();
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_host::{MemoryHost, WorldOp};
    use chunkreach_config::ServerProfile;
    use std::time::Duration;

    const GAME: &str = "mc.local";
    const CHUNK_SERVER: &str = "127.0.0.1:44444";

    #[derive(Debug, Default)]
    struct Recorded {
        connected: bool,
        connects: Vec<String>,
        disconnects: Vec<DisconnectReason>,
        chunks: Vec<Pos2>,
        requests: Vec<Vec<Pos2>>,
        strings: Vec<String>,
    }

    /// Link that records commands. Connection state is driven by the test.
    #[derive(Default)]
    struct FakeLink {
        recorded: Mutex<Recorded>,
    }

    impl FakeLink {
        fn set_connected(&self, connected: bool) {
            self.recorded.lock().unwrap().connected = connected;
        }

        fn connects(&self) -> Vec<String> {
            self.recorded.lock().unwrap().connects.clone()
        }

        fn disconnects(&self) -> Vec<DisconnectReason> {
            self.recorded.lock().unwrap().disconnects.clone()
        }

        fn chunks(&self) -> Vec<Pos2> {
            self.recorded.lock().unwrap().chunks.clone()
        }

        fn requests(&self) -> Vec<Vec<Pos2>> {
            self.recorded.lock().unwrap().requests.clone()
        }

        fn take_strings(&self) -> Vec<String> {
            std::mem::take(&mut self.recorded.lock().unwrap().strings)
        }
    }

    impl AuxLink for FakeLink {
        fn connect(&self, address: &str) {
            self.recorded.lock().unwrap().connects.push(address.to_string());
        }

        fn disconnect(&self, reason: DisconnectReason) {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.connected = false;
            recorded.disconnects.push(reason);
        }

        fn is_connected(&self) -> bool {
            self.recorded.lock().unwrap().connected
        }

        fn send_chunk(&self, chunk: Chunk) {
            self.recorded.lock().unwrap().chunks.push(chunk.pos);
        }

        fn send_chunks_request(&self, positions: &[Pos2]) {
            self.recorded.lock().unwrap().requests.push(positions.to_vec());
        }

        fn send_string_message(&self, text: &str) {
            self.recorded.lock().unwrap().strings.push(text.to_string());
        }
    }

    type Controller = AdmissionController<MemoryHost, FakeLink>;

    fn config(server_render_distance: i32, max_chunks_loaded: usize) -> Config {
        let mut config = Config::default();
        config.stream.max_chunks_loaded = max_chunks_loaded;
        config.servers.insert(
            GAME.to_string(),
            ServerProfile {
                chunk_server_address: CHUNK_SERVER.to_string(),
                server_render_distance,
            },
        );
        config
    }

    /// Client render distance 10, server render distance 4, player at origin.
    fn setup_with(config: Config) -> Arc<Controller> {
        let host = Arc::new(MemoryHost::new(Pos2::new(0, 0), 10));
        AdmissionController::new(host, FakeLink::default(), config, "1.2.3")
    }

    fn setup() -> Arc<Controller> {
        setup_with(config(4, 1000))
    }

    fn ingame_connected() -> Arc<Controller> {
        let controller = setup();
        controller.host().join_game(GAME);
        controller.on_game_connected();
        controller.link().set_connected(true);
        controller.handle_event(ConnectionEvent::Connected);
        controller.link().take_strings();
        controller
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_game_connected_installs_receiver_and_connects() {
        let controller = setup();
        controller.host().join_game(GAME);
        controller.on_game_connected();

        assert!(controller.host().was_receiver_inserted());
        assert_eq!(controller.server_render_distance(), 4);
        assert_eq!(controller.link().connects(), vec![CHUNK_SERVER.to_string()]);
    }

    #[test]
    fn test_game_connected_is_idempotent_per_session() {
        let controller = setup();
        controller.host().join_game(GAME);
        controller.on_game_connected();
        controller.on_game_connected();
        assert_eq!(controller.link().connects().len(), 1);
    }

    #[test]
    fn test_installed_receiver_routes_game_chunks() {
        let controller = setup();
        controller.host().join_game(GAME);
        controller.on_game_connected();

        assert!(controller.host().deliver_game_chunk(Chunk::empty(Pos2::new(1, 1))));
        controller.host().run_pending_tasks();
        assert!(controller.host().chunk(Pos2::new(1, 1)).is_some());
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let controller = setup();
        controller.host().join_game(GAME);
        let start = Instant::now();

        let mut attempts = Vec::new();
        for t in (0..=20_000).step_by(250) {
            let before = controller.link().connects().len();
            controller.on_tick_at(start + ms(t));
            if controller.link().connects().len() > before {
                attempts.push(t);
            }
        }
        assert_eq!(attempts, vec![0, 1000, 3000, 7000, 13_000, 19_000]);
    }

    #[test]
    fn test_connected_resets_backoff() {
        let controller = setup();
        controller.host().join_game(GAME);
        let start = Instant::now();
        controller.on_tick_at(start);
        controller.on_tick_at(start + ms(1000));
        controller.on_tick_at(start + ms(3000));
        assert_eq!(controller.link().connects().len(), 3);

        controller.link().set_connected(true);
        controller.handle_event(ConnectionEvent::Connected);
        controller.link().set_connected(false);
        controller.handle_event(ConnectionEvent::Disconnected(DisconnectReason::Unexpected(
            "reset by peer".to_string(),
        )));

        // Reset means the next attempt is immediate and 1 s after that.
        controller.on_tick_at(start + ms(3100));
        assert_eq!(controller.link().connects().len(), 4);
        controller.on_tick_at(start + ms(4000));
        assert_eq!(controller.link().connects().len(), 4);
        controller.on_tick_at(start + ms(4100));
        assert_eq!(controller.link().connects().len(), 5);
    }

    #[test]
    fn test_tick_is_noop_out_of_game_or_connected() {
        let controller = setup();
        controller.on_tick();
        assert!(controller.link().connects().is_empty());

        controller.host().join_game(GAME);
        controller.link().set_connected(true);
        controller.on_tick();
        assert!(controller.link().connects().is_empty());
    }

    #[test]
    fn test_unexpected_disconnect_retries_on_next_tick() {
        let controller = ingame_connected();
        let start = Instant::now();
        assert_eq!(controller.link().connects().len(), 1);

        controller.link().set_connected(false);
        controller.handle_event(ConnectionEvent::Disconnected(DisconnectReason::Unexpected(
            "read failed".to_string(),
        )));
        assert_eq!(controller.link().connects().len(), 1);

        controller.on_tick_at(start);
        assert_eq!(controller.link().connects().len(), 2);
    }

    #[test]
    fn test_missing_server_address_keeps_backoff() {
        let controller = setup();
        controller.host().join_without_address();
        let start = Instant::now();
        controller.on_tick_at(start);
        assert!(controller.link().connects().is_empty());

        controller.host().join_game(GAME);
        controller.on_tick_at(start);
        assert_eq!(controller.link().connects().len(), 1);
    }

    #[test]
    fn test_missing_profile_consumes_backoff() {
        let controller = setup_with(Config::default());
        controller.host().join_game(GAME);
        let start = Instant::now();
        controller.on_game_connected();
        assert_eq!(controller.server_render_distance(), 0);
        assert!(controller.link().connects().is_empty());

        controller.on_config_changed(config(4, 1000));
        assert_eq!(controller.server_render_distance(), 4);
        controller.on_tick_at(start + ms(500));
        assert!(controller.link().connects().is_empty());
        controller.on_tick_at(start + ms(1500));
        assert_eq!(controller.link().connects(), vec![CHUNK_SERVER.to_string()]);
    }

    #[test]
    fn test_handshake_order() {
        let controller = setup();
        controller.host().join_game(GAME);
        controller.host().set_dimension(-1);
        controller.on_game_connected();
        controller.link().set_connected(true);
        controller.handle_event(ConnectionEvent::Connected);

        assert_eq!(
            controller.link().take_strings(),
            vec![
                "mod.version=1.2.3".to_string(),
                "game.address=mc.local".to_string(),
                "game.dimension=-1".to_string(),
                "mod.chunksPerSecond=4".to_string(),
            ]
        );
    }

    #[test]
    fn test_connected_after_game_ended_disconnects() {
        let controller = setup();
        controller.link().set_connected(true);
        controller.handle_event(ConnectionEvent::Connected);

        assert!(controller.link().take_strings().is_empty());
        assert_eq!(
            controller.link().disconnects(),
            vec![DisconnectReason::Expected("No game running".to_string())]
        );
    }

    #[test]
    fn test_game_disconnect_is_expected() {
        let controller = ingame_connected();
        controller.host().leave_game();
        controller.on_game_disconnected();
        assert_eq!(
            controller.link().disconnects(),
            vec![DisconnectReason::Expected("Game ending".to_string())]
        );

        // Nothing to close the second time.
        controller.on_game_disconnected();
        assert_eq!(controller.link().disconnects().len(), 1);
        controller.on_tick();
        assert_eq!(controller.link().connects().len(), 1);
    }

    #[test]
    fn test_extra_chunk_distance_filter() {
        let controller = ingame_connected();
        let accepted = Pos2::new(5, 0);
        for pos in [accepted, Pos2::new(3, 0), Pos2::new(10, 0)] {
            controller.handle_event(ConnectionEvent::ExtraChunk(Chunk::empty(pos)));
        }
        assert_eq!(controller.host().pending_tasks(), 1);
        controller.host().run_pending_tasks();

        assert_eq!(
            controller.host().loaded_chunks().into_iter().collect::<Vec<_>>(),
            vec![accepted]
        );
        assert_eq!(
            controller.host().take_history(),
            vec![WorldOp::Unload(accepted), WorldOp::Load(accepted)]
        );
    }

    #[test]
    fn test_extra_chunk_out_of_game_is_discarded() {
        let controller = setup();
        controller.on_receive_extra_chunk(Chunk::empty(Pos2::new(5, 0)));
        assert_eq!(controller.host().pending_tasks(), 0);
    }

    #[test]
    fn test_extra_chunk_replaces_existing() {
        let controller = ingame_connected();
        let pos = Pos2::new(6, 6);
        controller.host().load_chunk(Chunk::empty(pos));

        let mut replacement = Chunk::empty(pos);
        replacement.set(0, 0, 0, 7);
        controller.on_receive_extra_chunk(replacement.clone());
        controller.host().run_pending_tasks();
        assert_eq!(controller.host().chunk(pos), Some(replacement));
        assert_eq!(controller.host().loaded_count(), 1);
    }

    #[test]
    fn test_extra_chunks_respect_cap() {
        let controller = setup_with(config(4, 3));
        controller.host().join_game(GAME);
        controller.on_game_connected();

        for x in 4..=9 {
            controller.on_receive_extra_chunk(Chunk::empty(Pos2::new(x, 0)));
        }
        controller.host().run_pending_tasks();

        let mut loaded: Vec<Pos2> = controller.host().loaded_chunks().into_iter().collect();
        loaded.sort();
        assert_eq!(loaded, vec![Pos2::new(4, 0), Pos2::new(5, 0), Pos2::new(6, 0)]);
    }

    #[test]
    fn test_game_chunk_forwarded_when_connected() {
        let controller = ingame_connected();
        let pos = Pos2::new(0, 0);
        controller.on_receive_game_chunk(Chunk::empty(pos));
        assert_eq!(controller.link().chunks(), vec![pos]);

        controller.host().run_pending_tasks();
        let history = controller.host().take_history();
        assert_eq!(&history[..2], &[WorldOp::Unload(pos), WorldOp::Load(pos)]);
        assert!(controller.host().chunk(pos).is_some());
        assert_eq!(controller.link().requests().len(), 1);
    }

    #[test]
    fn test_game_chunk_loaded_when_disconnected() {
        let controller = setup();
        controller.host().join_game(GAME);
        let pos = Pos2::new(1, 0);
        controller.on_receive_game_chunk(Chunk::empty(pos));
        controller.host().run_pending_tasks();

        assert!(controller.link().chunks().is_empty());
        assert!(controller.link().requests().is_empty());
        assert!(controller.host().chunk(pos).is_some());
    }

    #[test]
    fn test_game_chunk_prunes_out_of_range() {
        let controller = ingame_connected();
        let far = Pos2::new(30, 0);
        controller.host().load_chunk(Chunk::empty(far));
        controller.on_receive_game_chunk(Chunk::empty(Pos2::new(0, 0)));
        controller.host().run_pending_tasks();

        assert!(controller.host().chunk(far).is_none());
        assert!(controller.host().chunk(Pos2::new(0, 0)).is_some());
    }

    #[test]
    fn test_request_excludes_server_region_and_loaded() {
        let controller = ingame_connected();
        controller.host().load_chunk(Chunk::empty(Pos2::new(4, 0)));
        controller.request_extra_chunks();

        let requests = controller.link().requests();
        assert_eq!(requests.len(), 1);
        let positions = &requests[0];
        // 21x21 square minus the 7x7 server region minus one loaded chunk.
        assert_eq!(positions.len(), 441 - 49 - 1);
        assert!(!positions.contains(&Pos2::new(4, 0)));
        assert!(positions.iter().all(|p| p.chebyshev_distance(Pos2::new(0, 0)) >= 4));
        assert!(
            positions
                .windows(2)
                .all(|w| w[0].taxicab_distance(Pos2::new(0, 0))
                    <= w[1].taxicab_distance(Pos2::new(0, 0)))
        );
    }

    #[test]
    fn test_request_is_debounced_by_position() {
        let controller = ingame_connected();
        controller.request_extra_chunks();
        controller.request_extra_chunks();
        assert_eq!(controller.link().requests().len(), 1);

        controller.host().set_player(Pos2::new(1, 0));
        controller.request_extra_chunks();
        assert_eq!(controller.link().requests().len(), 2);
    }

    #[test]
    fn test_reconnect_requests_again_without_moving() {
        let controller = ingame_connected();
        let start = Instant::now();
        controller.request_extra_chunks();
        assert_eq!(controller.link().requests().len(), 1);

        controller.link().set_connected(false);
        controller.handle_event(ConnectionEvent::Disconnected(DisconnectReason::Unexpected(
            "read failed".to_string(),
        )));
        controller.on_tick_at(start);
        assert_eq!(controller.link().connects().len(), 2);
        controller.link().set_connected(true);
        controller.handle_event(ConnectionEvent::Connected);

        controller.on_receive_game_chunk(Chunk::empty(Pos2::new(0, 0)));
        controller.host().run_pending_tasks();
        assert_eq!(controller.link().requests().len(), 2);
    }

    #[test]
    fn test_new_game_session_requests_again_without_moving() {
        let controller = ingame_connected();
        controller.request_extra_chunks();
        assert_eq!(controller.link().requests().len(), 1);

        controller.host().leave_game();
        controller.host().join_game(GAME);
        controller.on_game_connected();
        controller.request_extra_chunks();
        assert_eq!(controller.link().requests().len(), 2);
    }

    #[test]
    fn test_request_limited_by_free_capacity() {
        let controller = setup_with(config(4, 10));
        controller.host().join_game(GAME);
        controller.on_game_connected();
        controller.link().set_connected(true);
        for x in 0..7 {
            controller.host().load_chunk(Chunk::empty(Pos2::new(x, 1)));
        }
        controller.request_extra_chunks();
        assert_eq!(controller.link().requests()[0].len(), 3);
    }

    #[test]
    fn test_request_at_cap_does_not_record_position() {
        let controller = setup_with(config(4, 2));
        controller.host().join_game(GAME);
        controller.on_game_connected();
        controller.link().set_connected(true);
        controller.host().load_chunk(Chunk::empty(Pos2::new(0, 0)));
        controller.host().load_chunk(Chunk::empty(Pos2::new(1, 0)));

        controller.request_extra_chunks();
        assert!(controller.link().requests().is_empty());

        // Same position, room again: not debounced.
        controller.host().unload_chunk(Pos2::new(1, 0));
        controller.request_extra_chunks();
        assert_eq!(controller.link().requests().len(), 1);
        assert_eq!(controller.link().requests()[0].len(), 1);
    }

    #[test]
    fn test_request_skipped_when_disconnected() {
        let controller = setup();
        controller.host().join_game(GAME);
        controller.request_extra_chunks();
        assert!(controller.link().requests().is_empty());
    }

    #[test]
    fn test_eviction_retains_closest() {
        let controller = setup_with(config(0, 5));
        controller.host().join_game(GAME);
        for pos in Pos2::new(0, 0).square_around(1) {
            controller.host().load_chunk(Chunk::empty(pos));
        }
        controller.evict_over_cap();

        let mut loaded: Vec<Pos2> = controller.host().loaded_chunks().into_iter().collect();
        loaded.sort();
        assert_eq!(
            loaded,
            vec![
                Pos2::new(-1, 0),
                Pos2::new(0, -1),
                Pos2::new(0, 0),
                Pos2::new(0, 1),
                Pos2::new(1, 0),
            ]
        );
    }

    #[test]
    fn test_config_change_resends_rate() {
        let controller = ingame_connected();
        let mut updated = config(6, 1000);
        updated.stream.chunk_loads_per_second = 9;
        controller.on_config_changed(updated);

        assert_eq!(controller.server_render_distance(), 6);
        assert_eq!(controller.link().take_strings(), vec!["mod.chunksPerSecond=9".to_string()]);
        assert_eq!(controller.config().stream.chunk_loads_per_second, 9);
    }

    #[test]
    fn test_dimension_change_forwarded() {
        let controller = ingame_connected();
        controller.on_player_changed_dimension(1);
        assert_eq!(controller.link().take_strings(), vec!["game.dimension=1".to_string()]);
    }

    #[test]
    fn test_world_tasks_skip_dropped_controller() {
        let controller = ingame_connected();
        let host = Arc::clone(controller.host());
        controller.on_receive_extra_chunk(Chunk::empty(Pos2::new(5, 0)));
        drop(controller);

        assert_eq!(host.run_pending_tasks(), 1);
        assert_eq!(host.loaded_count(), 0);
    }

    #[tokio::test]
    async fn test_event_pump_forwards_until_controller_dropped() {
        let controller = setup();
        controller.host().join_game(GAME);
        controller.link().set_connected(true);
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = AdmissionController::spawn_event_pump(&controller, rx, &Handle::current());

        tx.send(ConnectionEvent::ExtraChunk(Chunk::empty(Pos2::new(5, 0))))
            .unwrap();
        tx.send(ConnectionEvent::StatusMessage("hello".to_string()))
            .unwrap();
        while controller.host().pending_tasks() == 0 {
            tokio::task::yield_now().await;
        }

        drop(controller);
        tx.send(ConnectionEvent::Connected).unwrap();
        tokio::time::timeout(Duration::from_secs(5), pump)
            .await
            .unwrap()
            .unwrap();
    }
}
