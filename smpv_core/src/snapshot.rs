//! Per-turn working set of actors and bargaining links.
//!
//! Persistent actors are read once when the data is opened. Every turn load
//! drops the previous turn's bargain nodes and links, clears per-turn values
//! on the persistent actors, and rebuilds everything from the database.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use smpv_schema::{
    Actor, ActorId, BargainId, DimensionId, Link, LinkKey, LinkKind, NodeId, ScenarioId, Turn,
};
use tracing::{debug, info, instrument};

use crate::{
    binning::{ActorPower, BinnedTurn, ChartKey, PowerHistory},
    config::GraphConfig,
    error::{Result, SmpvError},
    store::{BargainSelector, SmpStore, ViewScope},
};

/// Rest length and strength given to every bargaining link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParams {
    pub strength: f64,
    pub distance: f64,
}

impl LinkParams {
    pub fn from_graph_config(config: &GraphConfig) -> Self {
        Self {
            strength: config.link_strength,
            distance: config.link_distance,
        }
    }
}

impl Default for LinkParams {
    fn default() -> Self {
        Self::from_graph_config(&GraphConfig::default())
    }
}

/// Detached copy of one turn's actors and links.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnSnapshot {
    pub turn: Turn,
    /// Persistent actors first (by id), then this turn's bargain nodes.
    pub actors: Vec<Actor>,
    pub links: Vec<Link>,
}

impl TurnSnapshot {
    pub fn persistent_actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.iter().filter(|actor| !actor.is_bargain())
    }

    pub fn bargain_nodes(&self) -> impl Iterator<Item = &Actor> {
        self.actors.iter().filter(|actor| actor.is_bargain())
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors
            .iter()
            .find(|actor| actor.id == NodeId::Actor(id))
    }

    pub fn accepted_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| link.accepted)
    }

    pub fn rejected_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| !link.accepted)
    }

    /// One chart key per persistent actor, colored by this turn's power.
    pub fn chart_keys(&self, power_reference: f64) -> Vec<ChartKey> {
        self.persistent_actors()
            .filter_map(|actor| {
                Some(ChartKey {
                    actor: actor.actor_id()?,
                    label: actor.label.clone(),
                    color: actor.color(power_reference)?,
                })
            })
            .collect()
    }

    pub fn power_samples(&self) -> Vec<ActorPower> {
        self.persistent_actors()
            .filter_map(ActorPower::from_actor)
            .collect()
    }

    pub fn binned(&self, power_reference: f64) -> BinnedTurn {
        BinnedTurn::bin(
            self.turn,
            self.chart_keys(power_reference),
            &self.power_samples(),
        )
    }
}

/// Loaded database plus the mutable per-turn working set.
pub struct SimulationData {
    store: SmpStore,
    scope: ViewScope,
    max_turn: Turn,
    link_params: LinkParams,
    actors: BTreeMap<NodeId, Actor>,
    links: BTreeMap<LinkKey, Link>,
    current_turn: Option<Turn>,
}

impl SimulationData {
    /// Reads the persistent actors of `scope` and the turn range.
    #[instrument(skip(store, scope, link_params), fields(scenario = %scope.scenario))]
    pub fn open(store: SmpStore, scope: ViewScope, link_params: LinkParams) -> Result<Self> {
        let (max_turn, actors) = read_persistent(&store, &scope)?;
        info!(
            target: "smpv::snapshot",
            actors = actors.len(),
            max_turn,
            "simulation.opened"
        );

        Ok(Self {
            store,
            scope,
            max_turn,
            link_params,
            actors,
            links: BTreeMap::new(),
            current_turn: None,
        })
    }

    /// Re-reads actors and the turn range from the same connection, then
    /// loads `turn` clamped to the new range. If that load fails the previous
    /// actors, range and working set are put back.
    pub fn refresh(&mut self, turn: Turn) -> Result<TurnSnapshot> {
        let (max_turn, actors) = read_persistent(&self.store, &self.scope)?;
        let previous = (
            std::mem::replace(&mut self.max_turn, max_turn),
            std::mem::replace(&mut self.actors, actors),
            std::mem::take(&mut self.links),
            self.current_turn.take(),
        );
        match self.load_turn(turn.min(max_turn)) {
            Ok(snapshot) => {
                info!(
                    target: "smpv::snapshot",
                    actors = self.actors.len(),
                    max_turn,
                    "simulation.refreshed"
                );
                Ok(snapshot)
            }
            Err(err) => {
                (self.max_turn, self.actors, self.links, self.current_turn) = previous;
                Err(err)
            }
        }
    }

    pub fn link_params(&self) -> LinkParams {
        self.link_params
    }

    /// Opens `scope`, or the first scenario of the database when `scenario`
    /// is `None`.
    pub fn open_default(
        store: SmpStore,
        scenario: Option<ScenarioId>,
        dimension: DimensionId,
        link_params: LinkParams,
    ) -> Result<Self> {
        let scenario = match scenario {
            Some(scenario) => scenario,
            None => store
                .scenarios()?
                .into_iter()
                .next()
                .map(|row| row.id)
                .ok_or_else(|| SmpvError::EmptyDatabase(ScenarioId::new("")))?,
        };
        Self::open(store, ViewScope::new(scenario, dimension), link_params)
    }

    pub fn store(&self) -> &SmpStore {
        &self.store
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    pub fn max_turn(&self) -> Turn {
        self.max_turn
    }

    pub fn current_turn(&self) -> Option<Turn> {
        self.current_turn
    }

    pub fn actor_ids(&self) -> BTreeSet<ActorId> {
        self.actors.values().filter_map(Actor::actor_id).collect()
    }

    /// Rebuilds the working set for `turn` and returns a copy of it.
    #[instrument(skip(self), fields(scenario = %self.scope.scenario))]
    pub fn load_turn(&mut self, turn: Turn) -> Result<TurnSnapshot> {
        if turn > self.max_turn {
            return Err(SmpvError::TurnOutOfRange {
                requested: turn,
                max_turn: self.max_turn,
            });
        }

        self.clear_turn();
        self.build_links(turn)?;
        self.apply_acceptance(turn)?;
        self.attach_power(turn)?;
        self.attach_positions(turn)?;
        self.current_turn = Some(turn);

        let snapshot = self.snapshot(turn);
        debug!(
            target: "smpv::snapshot",
            turn,
            actors = snapshot.actors.len(),
            links = snapshot.links.len(),
            accepted = snapshot.accepted_links().count(),
            "turn.loaded"
        );
        Ok(snapshot)
    }

    pub fn power_history(&self) -> Result<PowerHistory> {
        let power = self.store.effective_power_history(&self.scope)?;
        let positions = self.store.position_history(&self.scope)?;
        Ok(PowerHistory::from_rows(&power, &positions))
    }

    fn clear_turn(&mut self) {
        self.actors.retain(|_, actor| !actor.is_bargain());
        for actor in self.actors.values_mut() {
            actor.clear_turn_values();
        }
        self.links.clear();
    }

    fn build_links(&mut self, turn: Turn) -> Result<()> {
        let rows = self.store.bargains(&self.scope.scenario, turn)?;
        for row in rows {
            if row.is_self_bargain() {
                continue;
            }
            let bargain = NodeId::Bargain(row.bargain);
            self.actors
                .entry(bargain)
                .or_insert_with(|| Actor::bargain(row.bargain));

            let to_self = row.initiator == row.receiver;
            let to_bargain = self.link(
                NodeId::Actor(row.initiator),
                bargain,
                LinkKind::ToBargain,
                to_self,
            );
            let from_bargain = self.link(
                bargain,
                NodeId::Actor(row.receiver),
                LinkKind::FromBargain,
                to_self,
            );
            self.insert_link(row.bargain, to_bargain);
            self.insert_link(row.bargain, from_bargain);
        }
        Ok(())
    }

    fn link(&self, source: NodeId, target: NodeId, kind: LinkKind, to_self: bool) -> Link {
        Link {
            source,
            target,
            kind,
            strength: self.link_params.strength,
            distance: self.link_params.distance,
            to_self,
            accepted: false,
        }
    }

    fn insert_link(&mut self, bargain: BargainId, link: Link) {
        self.links.insert(
            LinkKey {
                bargain,
                kind: link.kind,
            },
            link,
        );
    }

    fn apply_acceptance(&mut self, turn: Turn) -> Result<()> {
        let rows = self.store.accepted_bargains(&self.scope.scenario, turn)?;
        for row in rows {
            let to_self = self
                .links
                .get(&LinkKey {
                    bargain: row.bargain,
                    kind: LinkKind::FromBargain,
                })
                .map(|link| link.to_self)
                .unwrap_or(false);

            for (kind, selector) in [
                (LinkKind::ToBargain, BargainSelector::Init),
                (LinkKind::FromBargain, BargainSelector::Rcvr),
            ] {
                let key = LinkKey {
                    bargain: row.bargain,
                    kind,
                };
                if let Some(link) = self.links.get_mut(&key) {
                    link.accepted = to_self || link.accepted || row.selector == selector;
                }
            }
        }
        Ok(())
    }

    fn attach_power(&mut self, turn: Turn) -> Result<()> {
        for row in self.store.effective_power(&self.scope, turn)? {
            match self.actors.get_mut(&NodeId::Actor(row.actor)) {
                Some(actor) => actor.effective_power = Some(row.power),
                None => debug!(
                    target: "smpv::snapshot",
                    actor = %row.actor,
                    "power.skipped=unknown_actor"
                ),
            }
        }
        Ok(())
    }

    fn attach_positions(&mut self, turn: Turn) -> Result<()> {
        for row in self.store.positions(&self.scope, turn)? {
            match self.actors.get_mut(&NodeId::Actor(row.actor)) {
                Some(actor) => actor.position = Some(row.position),
                None => debug!(
                    target: "smpv::snapshot",
                    actor = %row.actor,
                    "position.skipped=unknown_actor"
                ),
            }
        }
        Ok(())
    }

    fn snapshot(&self, turn: Turn) -> TurnSnapshot {
        TurnSnapshot {
            turn,
            actors: self.actors.values().cloned().collect(),
            links: self.links.values().cloned().collect(),
        }
    }
}

fn read_persistent(
    store: &SmpStore,
    scope: &ViewScope,
) -> Result<(Turn, BTreeMap<NodeId, Actor>)> {
    let scenarios = store.scenarios()?;
    if !scenarios.iter().any(|row| row.id == scope.scenario) {
        if scenarios.is_empty() {
            return Err(SmpvError::EmptyDatabase(scope.scenario.clone()));
        }
        return Err(SmpvError::UnknownScenario(scope.scenario.clone()));
    }

    let max_turn = store.max_turn(&scope.scenario)?;
    let actors = store
        .actor_descriptions(&scope.scenario)?
        .into_iter()
        .map(|row| {
            let actor = Actor::persistent(row.actor, row.name, row.description);
            (actor.id, actor)
        })
        .collect();
    Ok((max_turn, actors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{scope, small_store};

    fn data() -> SimulationData {
        SimulationData::open(small_store(), scope(), LinkParams::default()).unwrap()
    }

    #[test]
    fn self_bargains_produce_no_links_or_nodes() {
        let mut data = data();
        let snapshot = data.load_turn(0).unwrap();
        assert_eq!(snapshot.links.len(), 4);
        assert!(snapshot
            .links
            .iter()
            .all(|link| link.key().unwrap().bargain != BargainId(10)));
        let bargains: Vec<NodeId> = snapshot.bargain_nodes().map(|actor| actor.id).collect();
        assert_eq!(
            bargains,
            vec![NodeId::Bargain(BargainId(11)), NodeId::Bargain(BargainId(12))]
        );
    }

    #[test]
    fn acceptance_follows_selected_side() {
        let mut data = data();
        let snapshot = data.load_turn(0).unwrap();
        let accepted: Vec<LinkKey> = snapshot
            .accepted_links()
            .filter_map(Link::key)
            .collect();
        assert_eq!(
            accepted,
            vec![LinkKey {
                bargain: BargainId(11),
                kind: LinkKind::ToBargain,
            }]
        );
        assert_eq!(snapshot.rejected_links().count(), 3);

        let snapshot = data.load_turn(1).unwrap();
        let accepted: Vec<LinkKind> = snapshot.accepted_links().map(|link| link.kind).collect();
        assert_eq!(accepted, vec![LinkKind::FromBargain]);
    }

    #[test]
    fn links_use_configured_params() {
        let params = LinkParams {
            strength: 0.5,
            distance: 80.0,
        };
        let mut data = SimulationData::open(small_store(), scope(), params).unwrap();
        let snapshot = data.load_turn(0).unwrap();
        assert!(snapshot
            .links
            .iter()
            .all(|link| link.strength == 0.5 && link.distance == 80.0));
    }

    #[test]
    fn turn_change_replaces_bargain_nodes() {
        let mut data = data();
        data.load_turn(0).unwrap();
        let snapshot = data.load_turn(1).unwrap();
        let bargains: Vec<NodeId> = snapshot.bargain_nodes().map(|actor| actor.id).collect();
        assert_eq!(bargains, vec![NodeId::Bargain(BargainId(20))]);
        assert_eq!(snapshot.persistent_actors().count(), 3);
        assert_eq!(data.current_turn(), Some(1));
    }

    #[test]
    fn power_and_position_are_attached() {
        let mut data = data();
        let snapshot = data.load_turn(1).unwrap();
        let gamma = snapshot.actor(ActorId(2)).unwrap();
        assert_eq!(gamma.label, "Gamma");
        assert_eq!(gamma.effective_power, Some(30.0));
        assert_eq!(gamma.position, Some(65.0));
    }

    #[test]
    fn turn_values_are_reset_between_turns() {
        let store = small_store();
        let scope = scope();
        store
            .insert_actor(&scope.scenario, ActorId(3), "Delta", "")
            .unwrap();
        store.insert_capability(&scope.scenario, 0, ActorId(3), 10.0).unwrap();
        store.insert_salience(&scope, 0, ActorId(3), 1.0).unwrap();
        store.insert_position(&scope, 0, ActorId(3), 50.0).unwrap();

        let mut data = SimulationData::open(store, scope, LinkParams::default()).unwrap();
        let first = data.load_turn(0).unwrap();
        assert_eq!(first.actor(ActorId(3)).unwrap().position, Some(50.0));
        let second = data.load_turn(1).unwrap();
        let delta = second.actor(ActorId(3)).unwrap();
        assert_eq!(delta.position, None);
        assert_eq!(delta.effective_power, None);
    }

    #[test]
    fn rows_for_unknown_actors_are_skipped() {
        let store = small_store();
        let scope = scope();
        store.insert_position(&scope, 0, ActorId(99), 12.0).unwrap();
        let mut data = SimulationData::open(store, scope, LinkParams::default()).unwrap();
        let snapshot = data.load_turn(0).unwrap();
        assert_eq!(snapshot.persistent_actors().count(), 3);
    }

    #[test]
    fn turn_beyond_max_is_rejected() {
        let mut data = data();
        let err = data.load_turn(2).unwrap_err();
        assert!(matches!(
            err,
            SmpvError::TurnOutOfRange {
                requested: 2,
                max_turn: 1
            }
        ));
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let err = SimulationData::open(
            small_store(),
            ViewScope::new(ScenarioId::new("other"), scope().dimension),
            LinkParams::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SmpvError::UnknownScenario(_)));
    }

    #[test]
    fn binned_snapshot_sums_positioned_power() {
        let mut data = data();
        let snapshot = data.load_turn(0).unwrap();
        let binned = snapshot.binned(50.0);
        assert_eq!(binned.total_power(), 92.0);
        assert_eq!(binned.totals()[3], 72.0);
        assert_eq!(binned.totals()[0], 20.0);
    }

    #[test]
    fn history_covers_every_turn() {
        let data = data();
        let history = data.power_history().unwrap();
        assert_eq!(history.turn_count(), 2);
        assert_eq!(history.highest_range(), 72.0);
    }
}
