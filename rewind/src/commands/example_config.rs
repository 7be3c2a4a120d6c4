//! `example-config` subcommand

use abscissa_core::Runnable;
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{
    cli::ExampleConfigCmd,
    commands::AsyncRunnable,
    config::RewindConfig,
    error::{Error, ErrorKind},
    fl,
};

impl AsyncRunnable for ExampleConfigCmd {
    async fn run(&self) -> Result<(), Error> {
        let output = RewindConfig::generate_example();

        if self.output == "-" {
            println!("{output}");
            return Ok(());
        }

        let path = self.output.as_str();
        let mut f = if self.force {
            File::create(path).await
        } else {
            File::create_new(path).await
        }
        .map_err(|e| {
            ErrorKind::Generic.context(fl!(
                "err-example-config-write",
                path = path,
                error = e.to_string(),
            ))
        })?;
        f.write_all(output.as_bytes())
            .await
            .map_err(|e| ErrorKind::Generic.context(e))?;
        f.flush().await.map_err(|e| ErrorKind::Generic.context(e))?;
        println!("{}", fl!("example-config-written", conf = path));

        Ok(())
    }
}

impl Runnable for ExampleConfigCmd {
    fn run(&self) {
        self.run_on_runtime();
    }
}
