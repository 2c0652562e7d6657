//! SQLite access for SMP output databases.
//!
//! Only this module issues SQL. Every query decodes into a typed row struct
//! so the loaders never look columns up by name.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, Row};
use serde::Serialize;
use smpv_schema::{ActorId, BargainId, DimensionId, ScenarioId, Turn};
use tracing::{debug, instrument};

use crate::error::{Result, SmpvError};

const SCHEMA_SQL: &str = include_str!("data/schema.sql");

const BARGAINS_SQL: &str = "\
    SELECT B.BargnId, B.Init_Act_i, B.Recd_Act_j, AI.Name, AR.Name \
    FROM Bargn AS B \
    INNER JOIN ActorDescription AS AI \
        ON B.Init_Act_i = AI.Act_i AND B.ScenarioId = AI.ScenarioId \
    INNER JOIN ActorDescription AS AR \
        ON B.Recd_Act_j = AR.Act_i AND B.ScenarioId = AR.ScenarioId \
    WHERE B.ScenarioId = ?1 AND B.Turn_t = ?2 \
    ORDER BY B.BargnId";

const ACCEPTED_BARGAINS_SQL: &str = "\
    SELECT B.BargnId, B.Init_Act_i, B.Recd_Act_j, B.Q \
    FROM ( \
        SELECT ScenarioId, BargnId, Init_Act_i, Recd_Act_j, 'Init' AS Q \
        FROM Bargn WHERE Init_Seld = 1 AND ScenarioId = ?1 AND Turn_t = ?2 \
        UNION \
        SELECT ScenarioId, BargnId, Init_Act_i, Recd_Act_j, 'Rcvr' AS Q \
        FROM Bargn WHERE Recd_Seld = 1 AND ScenarioId = ?1 AND Turn_t = ?2 \
    ) AS B \
    INNER JOIN ActorDescription AS AI \
        ON B.Init_Act_i = AI.Act_i AND B.ScenarioId = AI.ScenarioId \
    INNER JOIN ActorDescription AS AR \
        ON B.Recd_Act_j = AR.Act_i AND B.ScenarioId = AR.ScenarioId \
    ORDER BY B.BargnId, B.Q";

// Capability may be recorded every turn or only once; the latest value at or
// before the salience turn is used.
const EFFECTIVE_POWER_SELECT: &str = "\
    SELECT DISTINCT c.Act_i, b.Turn_t, d.Cap * b.Sal AS fpower \
    FROM SpatialSalience AS b \
    INNER JOIN ActorDescription AS c \
        ON c.Act_i = b.Act_i AND c.ScenarioId = b.ScenarioId \
    INNER JOIN SpatialCapability AS d \
        ON d.Act_i = b.Act_i AND d.ScenarioId = b.ScenarioId \
       AND d.Turn_t = ( \
            SELECT MAX(Turn_t) FROM SpatialCapability \
            WHERE ScenarioId = b.ScenarioId AND Act_i = b.Act_i AND Turn_t <= b.Turn_t \
       ) \
    WHERE b.ScenarioId = ?1 AND b.Dim_k = ?2";

const POSITION_SELECT: &str = "\
    SELECT DISTINCT a.Act_i, a.Turn_t, a.Pos_Coord \
    FROM VectorPosition AS a \
    INNER JOIN ActorDescription AS c \
        ON c.Act_i = a.Act_i AND c.ScenarioId = a.ScenarioId \
    WHERE a.ScenarioId = ?1 AND a.Dim_k = ?2";

/// The (scenario, dimension) pair a view reads power and positions from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewScope {
    pub scenario: ScenarioId,
    pub dimension: DimensionId,
}

impl ViewScope {
    pub fn new(scenario: ScenarioId, dimension: DimensionId) -> Self {
        Self {
            scenario,
            dimension,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioRow {
    pub id: ScenarioId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionRow {
    pub id: DimensionId,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorDescriptionRow {
    pub actor: ActorId,
    pub name: String,
    pub description: String,
}

impl ActorDescriptionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            actor: ActorId(row.get(0)?),
            name: row.get(1)?,
            description: row.get(2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BargainRow {
    pub bargain: BargainId,
    pub initiator: ActorId,
    pub receiver: ActorId,
    pub initiator_name: String,
    pub receiver_name: String,
}

impl BargainRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            bargain: BargainId(row.get(0)?),
            initiator: ActorId(row.get(1)?),
            receiver: ActorId(row.get(2)?),
            initiator_name: row.get(3)?,
            receiver_name: row.get(4)?,
        })
    }

    pub fn is_self_bargain(&self) -> bool {
        self.initiator == self.receiver
    }
}

/// Which side of a bargain selected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BargainSelector {
    Init,
    Rcvr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedBargainRow {
    pub bargain: BargainId,
    pub initiator: ActorId,
    pub receiver: ActorId,
    pub selector: BargainSelector,
}

impl AcceptedBargainRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tag: String = row.get(3)?;
        let selector = match tag.as_str() {
            "Init" => BargainSelector::Init,
            "Rcvr" => BargainSelector::Rcvr,
            other => {
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("unknown bargain selector {other:?}").into(),
                ))
            }
        };
        Ok(Self {
            bargain: BargainId(row.get(0)?),
            initiator: ActorId(row.get(1)?),
            receiver: ActorId(row.get(2)?),
            selector,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectivePowerRow {
    pub actor: ActorId,
    pub turn: Turn,
    pub power: f64,
}

impl EffectivePowerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            actor: ActorId(row.get(0)?),
            turn: row.get(1)?,
            power: row.get(2)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRow {
    pub actor: ActorId,
    pub turn: Turn,
    pub position: f64,
}

impl PositionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            actor: ActorId(row.get(0)?),
            turn: row.get(1)?,
            position: row.get(2)?,
        })
    }
}

/// Bargain written by the sample generator and the fixtures.
#[derive(Debug, Clone, PartialEq)]
pub struct BargainRecord {
    pub turn: Turn,
    pub bargain: BargainId,
    pub initiator: ActorId,
    pub receiver: ActorId,
    pub init_selected: bool,
    pub recd_selected: bool,
}

pub struct SmpStore {
    conn: Connection,
}

impl SmpStore {
    /// Opens an existing SMP database read-only.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SmpvError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "database not found"),
            });
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!(target: "smpv::store", "store.opened=read_only");
        Ok(Self { conn })
    }

    /// Creates (or opens for writing) a database file and applies the schema.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        debug!(target: "smpv::store", "store.opened=read_write");
        Ok(store)
    }

    /// In-memory database with the schema applied (tests and demos).
    pub fn open_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Scenarios from `ScenarioDesc`, or the distinct ids used by
    /// `ActorDescription` when the description table is empty.
    pub fn scenarios(&self) -> Result<Vec<ScenarioRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT ScenarioId, Scenario, Desc FROM ScenarioDesc ORDER BY rowid")?;
        let described = stmt
            .query_map([], |row| {
                Ok(ScenarioRow {
                    id: ScenarioId(row.get(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if !described.is_empty() {
            return Ok(described);
        }

        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT ScenarioId FROM ActorDescription ORDER BY ScenarioId",
        )?;
        let ids = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                Ok(ScenarioRow {
                    id: ScenarioId(id.clone()),
                    name: id,
                    description: String::new(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn dimensions(&self, scenario: &ScenarioId) -> Result<Vec<DimensionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT v.Dim_k, COALESCE(d.Desc, '') \
             FROM VectorPosition AS v \
             LEFT JOIN DimensionDesc AS d \
                ON d.ScenarioId = v.ScenarioId AND d.Dim_k = v.Dim_k \
             WHERE v.ScenarioId = ?1 \
             ORDER BY v.Dim_k",
        )?;
        let rows = stmt
            .query_map(params![scenario.as_str()], |row| {
                Ok(DimensionRow {
                    id: DimensionId(row.get(0)?),
                    description: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn actor_descriptions(&self, scenario: &ScenarioId) -> Result<Vec<ActorDescriptionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT Act_i, Name, Desc FROM ActorDescription WHERE ScenarioId = ?1 ORDER BY Act_i",
        )?;
        let rows = stmt
            .query_map(params![scenario.as_str()], ActorDescriptionRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Last turn index recorded for the scenario.
    pub fn max_turn(&self, scenario: &ScenarioId) -> Result<Turn> {
        for sql in [
            "SELECT MAX(Turn_t) FROM Bargn WHERE ScenarioId = ?1",
            "SELECT MAX(Turn_t) FROM VectorPosition WHERE ScenarioId = ?1",
        ] {
            let max: Option<Turn> = self
                .conn
                .query_row(sql, params![scenario.as_str()], |row| row.get(0))?;
            if let Some(turn) = max {
                return Ok(turn);
            }
        }
        Err(SmpvError::EmptyDatabase(scenario.clone()))
    }

    #[instrument(skip(self, scenario), fields(scenario = %scenario))]
    pub fn bargains(&self, scenario: &ScenarioId, turn: Turn) -> Result<Vec<BargainRow>> {
        let mut stmt = self.conn.prepare(BARGAINS_SQL)?;
        let rows = stmt
            .query_map(params![scenario.as_str(), turn], BargainRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(target: "smpv::store", count = rows.len(), "bargains.loaded");
        Ok(rows)
    }

    #[instrument(skip(self, scenario), fields(scenario = %scenario))]
    pub fn accepted_bargains(
        &self,
        scenario: &ScenarioId,
        turn: Turn,
    ) -> Result<Vec<AcceptedBargainRow>> {
        let mut stmt = self.conn.prepare(ACCEPTED_BARGAINS_SQL)?;
        let rows = stmt
            .query_map(params![scenario.as_str(), turn], AcceptedBargainRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(target: "smpv::store", count = rows.len(), "accepted_bargains.loaded");
        Ok(rows)
    }

    pub fn effective_power(&self, scope: &ViewScope, turn: Turn) -> Result<Vec<EffectivePowerRow>> {
        let sql = format!("{EFFECTIVE_POWER_SELECT} AND b.Turn_t = ?3 ORDER BY c.Act_i");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![scope.scenario.as_str(), scope.dimension.0, turn],
                EffectivePowerRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn effective_power_history(&self, scope: &ViewScope) -> Result<Vec<EffectivePowerRow>> {
        let sql = format!("{EFFECTIVE_POWER_SELECT} ORDER BY b.Turn_t, c.Act_i");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![scope.scenario.as_str(), scope.dimension.0],
                EffectivePowerRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn positions(&self, scope: &ViewScope, turn: Turn) -> Result<Vec<PositionRow>> {
        let sql = format!("{POSITION_SELECT} AND a.Turn_t = ?3 ORDER BY a.Act_i");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![scope.scenario.as_str(), scope.dimension.0, turn],
                PositionRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn position_history(&self, scope: &ViewScope) -> Result<Vec<PositionRow>> {
        let sql = format!("{POSITION_SELECT} ORDER BY a.Turn_t, a.Act_i");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![scope.scenario.as_str(), scope.dimension.0],
                PositionRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Writers ────────────────────────────────────────────────

    pub fn insert_scenario(&self, scenario: &ScenarioId, name: &str, description: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ScenarioDesc (ScenarioId, Scenario, Desc) VALUES (?1, ?2, ?3)",
            params![scenario.as_str(), name, description],
        )?;
        Ok(())
    }

    pub fn insert_actor(
        &self,
        scenario: &ScenarioId,
        actor: ActorId,
        name: &str,
        description: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ActorDescription (ScenarioId, Act_i, Name, Desc) VALUES (?1, ?2, ?3, ?4)",
            params![scenario.as_str(), actor.0, name, description],
        )?;
        Ok(())
    }

    pub fn insert_dimension(
        &self,
        scenario: &ScenarioId,
        dimension: DimensionId,
        description: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO DimensionDesc (ScenarioId, Dim_k, Desc) VALUES (?1, ?2, ?3)",
            params![scenario.as_str(), dimension.0, description],
        )?;
        Ok(())
    }

    pub fn insert_bargain(&self, scenario: &ScenarioId, record: &BargainRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO Bargn (ScenarioId, Turn_t, BargnId, Init_Act_i, Recd_Act_j, Init_Seld, Recd_Seld) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                scenario.as_str(),
                record.turn,
                record.bargain.0,
                record.initiator.0,
                record.receiver.0,
                record.init_selected,
                record.recd_selected,
            ],
        )?;
        Ok(())
    }

    pub fn insert_capability(
        &self,
        scenario: &ScenarioId,
        turn: Turn,
        actor: ActorId,
        capability: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO SpatialCapability (ScenarioId, Turn_t, Act_i, Cap) VALUES (?1, ?2, ?3, ?4)",
            params![scenario.as_str(), turn, actor.0, capability],
        )?;
        Ok(())
    }

    pub fn insert_salience(
        &self,
        scope: &ViewScope,
        turn: Turn,
        actor: ActorId,
        salience: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO SpatialSalience (ScenarioId, Turn_t, Act_i, Dim_k, Sal) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![scope.scenario.as_str(), turn, actor.0, scope.dimension.0, salience],
        )?;
        Ok(())
    }

    pub fn insert_position(
        &self,
        scope: &ViewScope,
        turn: Turn,
        actor: ActorId,
        position: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO VectorPosition (ScenarioId, Turn_t, Act_i, Dim_k, Pos_Coord) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![scope.scenario.as_str(), turn, actor.0, scope.dimension.0, position],
        )?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn scope() -> ViewScope {
        ViewScope::new(ScenarioId::new("demo"), DimensionId(0))
    }

    /// Three actors over two turns. Bargain 10 is a self-bargain, bargain 11
    /// is accepted by the initiator only, bargain 12 by nobody.
    pub fn small_store() -> SmpStore {
        let store = SmpStore::open_memory().expect("memory store");
        let scope = scope();
        let scenario = &scope.scenario;
        store.insert_scenario(scenario, "Demo", "fixture").unwrap();
        store.insert_dimension(scenario, DimensionId(0), "Tax").unwrap();
        for (id, name) in [(0, "Alpha"), (1, "Beta"), (2, "Gamma")] {
            store.insert_actor(scenario, ActorId(id), name, "").unwrap();
        }
        for turn in 0..=1u32 {
            for (id, cap, sal, pos) in [
                (0, 40.0, 0.5, 5.0),
                (1, 84.0, 0.5, 35.0),
                (2, 30.0, 1.0, 35.0 + turn as f64 * 30.0),
            ] {
                store.insert_capability(scenario, turn, ActorId(id), cap).unwrap();
                store.insert_salience(&scope, turn, ActorId(id), sal).unwrap();
                store.insert_position(&scope, turn, ActorId(id), pos).unwrap();
            }
        }
        for record in [
            BargainRecord {
                turn: 0,
                bargain: BargainId(10),
                initiator: ActorId(0),
                receiver: ActorId(0),
                init_selected: true,
                recd_selected: false,
            },
            BargainRecord {
                turn: 0,
                bargain: BargainId(11),
                initiator: ActorId(0),
                receiver: ActorId(1),
                init_selected: true,
                recd_selected: false,
            },
            BargainRecord {
                turn: 0,
                bargain: BargainId(12),
                initiator: ActorId(2),
                receiver: ActorId(1),
                init_selected: false,
                recd_selected: false,
            },
            BargainRecord {
                turn: 1,
                bargain: BargainId(20),
                initiator: ActorId(1),
                receiver: ActorId(2),
                init_selected: false,
                recd_selected: true,
            },
        ] {
            store.insert_bargain(scenario, &record).unwrap();
        }
        store
    }
}
