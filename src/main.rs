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

use rtuhub::server::{RaspberryPi, RtuHub};
use rtuhub::RtuError;

/// The main entry point for `rtuhub` on real Raspberry Pi GPIO/SPI hardware.
///
/// # Arguments
///
/// The first argument is the path to the SQLite database file to use for
/// configuration and history (created if absent). The second argument is
/// the path to the console log file. Pin assignments come from the
/// `RTUHUB_SPI_*`/`RTUHUB_ADC_CS` environment variables (see
/// `server::RaspberryPi`).
fn main() -> Result<(), RtuError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = args.first().map_or("rtuhub.sqlite3", String::as_str);
    let log_path = args.get(1).map_or_else(|| PathBuf::from("rtuhub.log"), PathBuf::from);

    let hub = std::sync::Arc::new(RtuHub::new::<RaspberryPi>(db_path, &log_path)?);
    hub.init()?;
    hub.start()?;
    let _ = hub.log.info("rtuhub started");

    wait_for_shutdown_signal();

    hub.stop();
    let _ = hub.log.info("rtuhub stopped");
    Ok(())
}

/// Block until the process is asked to stop. There is no signal-handling
/// crate in the dependency stack; an operator sends a signal from outside
/// (e.g. via a process supervisor) and the OS delivers the default
/// terminate action, which is sufficient since `hub.stop()` has nothing left
/// to flush that a clean process exit wouldn't already guarantee for the
/// SQLite WAL.
fn wait_for_shutdown_signal() {
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}
