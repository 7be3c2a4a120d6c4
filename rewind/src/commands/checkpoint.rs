//! `checkpoint` subcommand

use abscissa_core::{Application, Runnable};
use zcash_protocol::consensus::BlockHeight;

use crate::{
    cli::CheckpointCmd,
    commands::AsyncRunnable,
    components::checkpoints::{Checkpoint, CheckpointResolver, Checkpoints},
    error::Error,
    fl,
    prelude::APP,
};

impl CheckpointCmd {
    fn resolve(&self, resolver: &CheckpointResolver) -> Checkpoint {
        match (self.height, self.date) {
            (Some(height), _) => resolver.resolve_height(BlockHeight::from_u32(height)),
            (None, Some(date)) => resolver.resolve_time(date),
            // Rejected by clap.
            (None, None) => Checkpoint::genesis(),
        }
    }
}

impl AsyncRunnable for CheckpointCmd {
    async fn run(&self) -> Result<(), Error> {
        let config = APP.config();
        let path = config.checkpoints_path();

        let resolver = if self.strict {
            CheckpointResolver::new(Checkpoints::load_from(&path).await?)
        } else {
            CheckpointResolver::load_or_genesis(&path).await
        };
        let checkpoint = self.resolve(&resolver);

        println!(
            "{}",
            fl!(
                "checkpoint-loaded",
                count = resolver.checkpoints().len(),
                path = path.display().to_string(),
            )
        );
        if checkpoint.is_genesis() {
            println!("{}", fl!("checkpoint-genesis"));
        } else {
            println!(
                "{}",
                fl!(
                    "checkpoint-resolved",
                    height = u32::from(checkpoint.height()),
                    timestamp = checkpoint.timestamp().unix_timestamp(),
                    hash = checkpoint
                        .hash()
                        .map(|hash| hash.to_string())
                        .unwrap_or_default(),
                )
            );
        }

        Ok(())
    }
}

impl Runnable for CheckpointCmd {
    fn run(&self) {
        self.run_on_runtime();
    }
}
