use crate::commands::{async_runtime, load_config, CommandResult, Failure};
use shelfwise_core::config::LoadOptions;
use shelfwise_db::{connect_from_config, migrations};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("migrate", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<usize, Failure>(migrations::MIGRATOR.iter().count())
    });

    match result {
        Ok(known) => CommandResult::success(
            "migrate",
            format!("applied pending migrations ({known} known to this build)"),
        ),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
