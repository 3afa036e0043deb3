use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::time::interval;

use racefeed::api::RacingApi;
use racefeed::board;
use racefeed::config::Config;
use racefeed::countdown::CountdownSet;
use racefeed::logging::{self, obj, v_str, Domain};
use racefeed::store::RaceStore;

fn print_board(store: &RaceStore, countdowns: &mut CountdownSet) {
    let snapshot = store.snapshot();
    countdowns.sync(&snapshot.next_to_go);
    println!("{}", board::render(&snapshot, countdowns));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let base = cfg.effective_base();
    let api = RacingApi::new(&base, cfg.request_timeout)?;

    logging::info(
        Domain::System,
        "startup",
        obj(&[
            ("base", v_str(&base)),
            ("timeout_secs", json!(cfg.request_timeout.as_secs())),
            ("fetch_count", json!(cfg.fetch_count)),
            ("refresh_secs", json!(cfg.refresh_every.as_secs())),
            ("country", v_str(&cfg.country.to_string())),
        ]),
    );

    let store = RaceStore::new(
        Arc::new(api),
        Arc::new(racefeed::clock::SystemClock),
        cfg.store_settings(),
    );
    let mut countdowns = CountdownSet::new(store.clock());

    if cfg.once {
        store.fetch().await;
        print_board(&store, &mut countdowns);
        countdowns.clear();
        return Ok(());
    }

    store.start_auto_refresh();

    let mut ticker = interval(cfg.board_every);
    loop {
        tokio::select! {
            _ = ticker.tick() => print_board(&store, &mut countdowns),
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    logging::error(
                        Domain::System,
                        "signal_failed",
                        obj(&[("msg", v_str(&e.to_string()))]),
                    );
                }
                break;
            }
        }
    }

    store.stop_auto_refresh();
    countdowns.clear();
    logging::info(Domain::System, "shutdown", obj(&[]));
    Ok(())
}
