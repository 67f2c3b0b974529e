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

use std::path::PathBuf;

use rtuhub::server::{Dummy, RtuHub};
use rtuhub::RtuError;

/// A dummy entry point for `rtuhub`: sensor reads are substituted with
/// constant values so the whole pipeline — sampler, alarm engine, actuator
/// controller, PROFINET bridge, data logger — can be exercised on any Linux
/// machine, without real GPIO/SPI hardware.
///
/// # Arguments
///
/// The first argument is the SQLite database path (`:memory:` is fine here).
/// The second argument is the console log file path.
fn main() -> Result<(), RtuError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = args.first().map_or(":memory:", String::as_str);
    let log_path = args.get(1).map_or_else(|| PathBuf::from("rtuhub-dummy.log"), PathBuf::from);

    let hub = std::sync::Arc::new(RtuHub::new::<Dummy>(db_path, &log_path)?);
    hub.init()?;
    hub.start()?;
    let _ = hub.log.info("rtuhub (dummy hardware) started");

    std::thread::sleep(std::time::Duration::from_secs(10));

    hub.stop();
    let _ = hub.log.info("rtuhub (dummy hardware) stopped");
    Ok(())
}
