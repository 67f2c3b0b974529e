/*
  rtuhub, a PROFINET sensor hub / remote terminal unit core.
  Copyright (C) 2026 rtuhub contributors.

  rtuhub is free software: you can redistribute it and/or modify
  it under the terms of the GNU General Public License as published by
  the Free Software Foundation, either version 3 of the License, or
  (at your option) any later version.

  rtuhub is distributed in the hope that it will be useful,
  but WITHOUT ANY WARRANTY; without even the implied warranty of
  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
  GNU General Public License for more details.

  You should have received a copy of the GNU General Public License
  along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! The persistence layer (spec.md §4.7): a transactional SQLite row store
//! for configuration, alarm history, the sensor data log, and free-form
//! events.
//!
//! Every row type in `model` is already `Serialize`/`Deserialize`; rather
//! than hand-mapping a dozen heterogeneous, tagged-union structs field by
//! field onto SQL columns, each table keeps its queryable keys (ids,
//! `module_id`, `state`, `timestamp`) as real columns and the row body as a
//! `serde_json` blob. This is the same trade the teacher makes in
//! `outgoing::Message` — JSON on the wire, native structs off it — applied
//! to the database instead of a socket.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{ErrorKind, RtuError};
use crate::logger::{LocalSink, LogEntry};
use crate::model::{ActuatorConfig, AlarmInstance, AlarmRule, Module, SensorConfig};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS modules (
    id INTEGER PRIMARY KEY,
    slot INTEGER NOT NULL UNIQUE,
    body TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sensor_configs (
    module_id INTEGER PRIMARY KEY REFERENCES modules(id) ON DELETE CASCADE,
    body TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS alarm_rules (
    id INTEGER PRIMARY KEY,
    module_id INTEGER REFERENCES modules(id) ON DELETE CASCADE,
    body TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS alarm_history (
    id INTEGER PRIMARY KEY,
    rule_id INTEGER NOT NULL,
    module_id INTEGER,
    state TEXT NOT NULL,
    raised_at TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alarm_history_state ON alarm_history(state);
CREATE TABLE IF NOT EXISTS actuators (
    slot INTEGER PRIMARY KEY,
    body TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sensor_data_log (
    id INTEGER PRIMARY KEY,
    module_id INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    value REAL NOT NULL,
    status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sensor_data_log_module_ts ON sensor_data_log(module_id, timestamp);
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY,
    timestamp TEXT NOT NULL,
    severity TEXT NOT NULL,
    source TEXT NOT NULL,
    message TEXT NOT NULL
);
";

/// A transactional row store over a SQLite database file (or `:memory:`).
pub struct Persistence {
    conn: Mutex<Connection>,
}

impl Persistence {
    /// Open (creating if needed) a database at `path`, enabling
    /// write-ahead journaling, foreign key enforcement, and a 5 s busy
    /// timeout (spec.md §4.7), then ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::IoError` if the database cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: &str) -> Result<Persistence, RtuError> {
        let conn = Connection::open(path).map_err(|e| RtuError::new(ErrorKind::IoError, e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(|e| RtuError::new(ErrorKind::IoError, e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", true).map_err(|e| RtuError::new(ErrorKind::IoError, e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5)).map_err(|e| RtuError::new(ErrorKind::IoError, e.to_string()))?;
        conn.execute_batch(SCHEMA).map_err(|e| RtuError::new(ErrorKind::IoError, e.to_string()))?;
        Ok(Persistence { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- Modules -----------------------------------------------------

    /// Insert or replace a module row and its sensor configuration.
    pub fn put_module(&self, module: &Module, sensor_config: &SensorConfig) -> Result<(), RtuError> {
        let conn = self.lock();
        let module_body = serde_json::to_string(module).map_err(json_err)?;
        let config_body = serde_json::to_string(sensor_config).map_err(json_err)?;
        conn.execute(
            "INSERT INTO modules (id, slot, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET slot = excluded.slot, body = excluded.body",
            params![module.id, module.slot, module_body],
        )
        .map_err(sql_err)?;
        conn.execute(
            "INSERT INTO sensor_configs (module_id, body) VALUES (?1, ?2)
             ON CONFLICT(module_id) DO UPDATE SET body = excluded.body",
            params![module.id, config_body],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Fetch a module and its sensor configuration by id.
    pub fn get_module(&self, id: i64) -> Result<Option<(Module, SensorConfig)>, RtuError> {
        let conn = self.lock();
        let module_body: Option<String> =
            conn.query_row("SELECT body FROM modules WHERE id = ?1", params![id], |r| r.get(0)).optional().map_err(sql_err)?;
        let Some(module_body) = module_body else { return Ok(None) };
        let config_body: String =
            conn.query_row("SELECT body FROM sensor_configs WHERE module_id = ?1", params![id], |r| r.get(0)).map_err(sql_err)?;
        let module: Module = serde_json::from_str(&module_body).map_err(json_err)?;
        let config: SensorConfig = serde_json::from_str(&config_body).map_err(json_err)?;
        Ok(Some((module, config)))
    }

    /// List every configured module with its sensor configuration.
    pub fn list_modules(&self) -> Result<Vec<(Module, SensorConfig)>, RtuError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT m.body, s.body FROM modules m JOIN sensor_configs s ON s.module_id = m.id ORDER BY m.id")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            let (module_body, config_body) = row.map_err(sql_err)?;
            out.push((
                serde_json::from_str(&module_body).map_err(json_err)?,
                serde_json::from_str(&config_body).map_err(json_err)?,
            ));
        }
        Ok(out)
    }

    /// Delete a module (cascades to its sensor configuration and rules).
    pub fn delete_module(&self, id: i64) -> Result<(), RtuError> {
        self.lock().execute("DELETE FROM modules WHERE id = ?1", params![id]).map_err(sql_err)?;
        Ok(())
    }

    // -- Alarm rules ---------------------------------------------------

    /// Insert or replace an alarm rule.
    pub fn put_alarm_rule(&self, rule: &AlarmRule) -> Result<(), RtuError> {
        let module_id = match rule.target {
            crate::model::AlarmTarget::Module(id) => Some(id),
            crate::model::AlarmTarget::System => None,
        };
        let body = serde_json::to_string(rule).map_err(json_err)?;
        self.lock()
            .execute(
                "INSERT INTO alarm_rules (id, module_id, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET module_id = excluded.module_id, body = excluded.body",
                params![rule.id, module_id, body],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    /// List every configured alarm rule.
    pub fn list_alarm_rules(&self) -> Result<Vec<AlarmRule>, RtuError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT body FROM alarm_rules ORDER BY id").map_err(sql_err)?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0)).map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row.map_err(sql_err)?).map_err(json_err)?);
        }
        Ok(out)
    }

    /// Delete an alarm rule.
    pub fn delete_alarm_rule(&self, id: i64) -> Result<(), RtuError> {
        self.lock().execute("DELETE FROM alarm_rules WHERE id = ?1", params![id]).map_err(sql_err)?;
        Ok(())
    }

    /// Append an alarm history row (instances are insert-only; they are
    /// never deleted, only re-inserted with an updated state).
    pub fn put_alarm_instance(&self, instance: &AlarmInstance) -> Result<(), RtuError> {
        let module_id = match instance.target {
            crate::model::AlarmTarget::Module(id) => Some(id),
            crate::model::AlarmTarget::System => None,
        };
        let state = format!("{:?}", instance.state).to_uppercase();
        let body = serde_json::to_string(instance).map_err(json_err)?;
        self.lock()
            .execute(
                "INSERT INTO alarm_history (id, rule_id, module_id, state, raised_at, body) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET state = excluded.state, body = excluded.body",
                params![instance.id, instance.rule_id, module_id, state, instance.raised_at.to_rfc3339(), body],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    /// List alarm history rows currently in the given state (e.g. "ACTIVE").
    pub fn list_alarm_history_by_state(&self, state: &str) -> Result<Vec<AlarmInstance>, RtuError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT body FROM alarm_history WHERE state = ?1 ORDER BY raised_at")
            .map_err(sql_err)?;
        let rows = stmt.query_map(params![state.to_uppercase()], |r| r.get::<_, String>(0)).map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row.map_err(sql_err)?).map_err(json_err)?);
        }
        Ok(out)
    }

    // -- Actuators -------------------------------------------------------

    /// Insert or replace an actuator configuration.
    pub fn put_actuator(&self, actuator: &ActuatorConfig) -> Result<(), RtuError> {
        let body = serde_json::to_string(actuator).map_err(json_err)?;
        self.lock()
            .execute(
                "INSERT INTO actuators (slot, body) VALUES (?1, ?2)
                 ON CONFLICT(slot) DO UPDATE SET body = excluded.body",
                params![actuator.slot, body],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    /// List every configured actuator.
    pub fn list_actuators(&self) -> Result<Vec<ActuatorConfig>, RtuError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT body FROM actuators ORDER BY slot").map_err(sql_err)?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0)).map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row.map_err(sql_err)?).map_err(json_err)?);
        }
        Ok(out)
    }

    /// Delete an actuator.
    pub fn delete_actuator(&self, slot: u8) -> Result<(), RtuError> {
        self.lock().execute("DELETE FROM actuators WHERE slot = ?1", params![slot]).map_err(sql_err)?;
        Ok(())
    }

    // -- Events ------------------------------------------------------

    /// Append a structured event row.
    pub fn put_event(&self, timestamp: DateTime<Utc>, severity: &str, source: &str, message: &str) -> Result<(), RtuError> {
        self.lock()
            .execute(
                "INSERT INTO events (timestamp, severity, source, message) VALUES (?1, ?2, ?3, ?4)",
                params![timestamp.to_rfc3339(), severity, source, message],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    /// Delete event rows older than `retain_since`.
    pub fn event_cleanup(&self, retain_since: DateTime<Utc>) -> Result<usize, RtuError> {
        self.lock()
            .execute("DELETE FROM events WHERE timestamp < ?1", params![retain_since.to_rfc3339()])
            .map_err(sql_err)
    }

    /// Delete sensor data log rows older than `retain_since`.
    pub fn sensor_log_cleanup(&self, retain_since: DateTime<Utc>) -> Result<usize, RtuError> {
        self.lock()
            .execute("DELETE FROM sensor_data_log WHERE timestamp < ?1", params![retain_since.to_rfc3339()])
            .map_err(sql_err)
    }

    /// Count sensor data log rows for a module (test/diagnostic helper).
    #[cfg(test)]
    fn count_sensor_log(&self, module_id: i64) -> i64 {
        self.lock()
            .query_row("SELECT COUNT(*) FROM sensor_data_log WHERE module_id = ?1", params![module_id], |r| r.get(0))
            .unwrap_or(0)
    }
}

impl LocalSink for Persistence {
    fn insert_log_batch(&self, entries: &[LogEntry]) -> Result<(), RtuError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO sensor_data_log (module_id, timestamp, value, status) VALUES (?1, ?2, ?3, ?4)")
                .map_err(sql_err)?;
            for e in entries {
                stmt.execute(params![e.module_id, e.timestamp.to_rfc3339(), e.value, e.status]).map_err(sql_err)?;
            }
        }
        tx.commit().map_err(sql_err)?;
        Ok(())
    }
}

fn sql_err(e: rusqlite::Error) -> RtuError {
    RtuError::new(ErrorKind::IoError, e.to_string())
}

fn json_err(e: serde_json::Error) -> RtuError {
    RtuError::new(ErrorKind::IoError, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActuatorKind, ActuatorState, AlarmCondition, AlarmState, AlarmTarget, Interlock, InterlockAction, Severity};

    fn sample_module(id: i64, slot: u8) -> (Module, SensorConfig) {
        (
            Module { id, slot, subslot: 1, name: format!("m{id}"), module_type: "adc".into(), module_ident: 0, submodule_ident: 0, status: String::new() },
            SensorConfig::Static { value: 0.0, writable: false },
        )
    }

    #[test]
    fn module_round_trips_through_storage() {
        let db = Persistence::open(":memory:").unwrap();
        let (module, config) = sample_module(1, 5);
        db.put_module(&module, &config).unwrap();
        let (got_module, got_config) = db.get_module(1).unwrap().unwrap();
        assert_eq!(got_module, module);
        assert_eq!(got_config, config);
    }

    #[test]
    fn deleting_a_module_cascades_to_its_sensor_config() {
        let db = Persistence::open(":memory:").unwrap();
        let (module, config) = sample_module(1, 5);
        db.put_module(&module, &config).unwrap();
        db.delete_module(1).unwrap();
        assert!(db.get_module(1).unwrap().is_none());
    }

    #[test]
    fn list_modules_returns_every_configured_module_in_id_order() {
        let db = Persistence::open(":memory:").unwrap();
        let (m1, c1) = sample_module(2, 5);
        let (m2, c2) = sample_module(1, 6);
        db.put_module(&m1, &c1).unwrap();
        db.put_module(&m2, &c2).unwrap();
        let rows = db.list_modules().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.id, 1);
        assert_eq!(rows[1].0.id, 2);
    }

    fn sample_rule(id: i64) -> AlarmRule {
        AlarmRule {
            id,
            target: AlarmTarget::Module(1),
            name: "high temp".into(),
            condition: AlarmCondition::Above,
            threshold_high: 80.0,
            threshold_low: 0.0,
            setpoint: 0.0,
            severity: Severity::High,
            enabled: true,
            auto_clear: true,
            hysteresis_percent: 5.0,
            interlock: Interlock { enabled: false, target_slot: 0, action: InterlockAction::None, pwm_duty: 0, release_on_clear: true },
        }
    }

    #[test]
    fn alarm_rule_round_trips_and_can_be_deleted() {
        let db = Persistence::open(":memory:").unwrap();
        let rule = sample_rule(1);
        db.put_alarm_rule(&rule).unwrap();
        assert_eq!(db.list_alarm_rules().unwrap(), vec![rule]);
        db.delete_alarm_rule(1).unwrap();
        assert!(db.list_alarm_rules().unwrap().is_empty());
    }

    #[test]
    fn alarm_history_is_queryable_by_state_and_updatable_in_place() {
        let db = Persistence::open(":memory:").unwrap();
        let now = Utc::now();
        let instance = AlarmInstance {
            id: 1,
            rule_id: 1,
            target: AlarmTarget::Module(1),
            severity: Severity::High,
            state: AlarmState::Active,
            trigger_value: 90.0,
            message: "too hot".into(),
            raised_at: now,
            acknowledged_at: None,
            cleared_at: None,
            acknowledged_by: None,
        };
        db.put_alarm_instance(&instance).unwrap();
        assert_eq!(db.list_alarm_history_by_state("ACTIVE").unwrap().len(), 1);
        assert!(db.list_alarm_history_by_state("CLEARED").unwrap().is_empty());

        let mut cleared = instance;
        cleared.state = AlarmState::Cleared;
        cleared.cleared_at = Some(now);
        db.put_alarm_instance(&cleared).unwrap();
        assert!(db.list_alarm_history_by_state("ACTIVE").unwrap().is_empty());
        assert_eq!(db.list_alarm_history_by_state("CLEARED").unwrap().len(), 1);
    }

    #[test]
    fn actuator_round_trips_and_can_be_deleted() {
        let db = Persistence::open(":memory:").unwrap();
        let actuator = ActuatorConfig {
            slot: 9,
            name: "pump1".into(),
            kind: ActuatorKind::Pump,
            gpio_pin: 17,
            active_low: false,
            safe_state: ActuatorState::Off,
            min_on_time_ms: 500,
            max_on_time_ms: 60_000,
            pwm_frequency_hz: 0,
            enabled: true,
        };
        db.put_actuator(&actuator).unwrap();
        assert_eq!(db.list_actuators().unwrap(), vec![actuator]);
        db.delete_actuator(9).unwrap();
        assert!(db.list_actuators().unwrap().is_empty());
    }

    #[test]
    fn local_sink_inserts_a_batch_in_one_transaction() {
        let db = Persistence::open(":memory:").unwrap();
        let now = Utc::now();
        let batch = vec![
            LogEntry { module_id: 1, value: 1.0, status: "Good".into(), timestamp: now },
            LogEntry { module_id: 1, value: 2.0, status: "Good".into(), timestamp: now },
        ];
        db.insert_log_batch(&batch).unwrap();
        assert_eq!(db.count_sensor_log(1), 2);
    }

    #[test]
    fn sensor_log_cleanup_deletes_only_rows_older_than_the_retention_window() {
        let db = Persistence::open(":memory:").unwrap();
        let now = Utc::now();
        let old = vec![LogEntry { module_id: 1, value: 1.0, status: "Good".into(), timestamp: now - chrono::Duration::days(10) }];
        let fresh = vec![LogEntry { module_id: 1, value: 2.0, status: "Good".into(), timestamp: now }];
        db.insert_log_batch(&old).unwrap();
        db.insert_log_batch(&fresh).unwrap();
        let deleted = db.sensor_log_cleanup(now - chrono::Duration::days(1)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(db.count_sensor_log(1), 1);
    }

    #[test]
    fn event_cleanup_deletes_only_rows_older_than_the_retention_window() {
        let db = Persistence::open(":memory:").unwrap();
        let now = Utc::now();
        db.put_event(now - chrono::Duration::days(10), "INFO", "test", "old").unwrap();
        db.put_event(now, "INFO", "test", "fresh").unwrap();
        let deleted = db.event_cleanup(now - chrono::Duration::days(1)).unwrap();
        assert_eq!(deleted, 1);
    }
}
