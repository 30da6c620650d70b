use crate::commands::{async_runtime, load_config, CommandResult, Failure};
use shelfwise_core::config::LoadOptions;
use shelfwise_db::{connect_from_config, migrations, SeedDataset, SeedResult, VerificationResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("seed") {
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

        let seeded = SeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        // Only fresh loads are verified; stock moves once orders exist.
        let checked: Result<SeedResult, Failure> = if seeded.skipped {
            Ok(seeded)
        } else {
            let verification = SeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
            if verification.all_present {
                Ok(seeded)
            } else {
                Err(("seed_verification", verification_message(&verification), 6u8))
            }
        };

        pool.close().await;
        checked
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn summary(seeded: &SeedResult) -> String {
    if seeded.skipped {
        return "catalog already holds data; seed dataset left untouched".to_string();
    }
    format!(
        "seed dataset loaded: {} books, {} customers, {} historical orders",
        seeded.books, seeded.customers, seeded.orders
    )
}

fn verification_message(verification: &VerificationResult) -> String {
    let failed = verification.failed_checks();
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}
