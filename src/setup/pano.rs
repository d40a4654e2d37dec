//! Single-node pano setup.
//!
//! Provisions one pano chain on the local machine: a fresh primary
//! account, genesis contracts built around it, the pano binary, and the
//! operator scripts to initialize, start and reset the chain.

use crate::external::{ProcessRunner, RepositoryCloner, TemplateContext, TemplateRenderer};
use crate::config::NetworkConfig;
use crate::identity::NodeKeypair;
use crate::keystore;
use crate::mutator::{FieldKey, FileReplacer};
use crate::pipeline::{Pipeline, Step, StepOutcome};
use crate::setup::genesis::Genesis;
use crate::setup::ProvisionState;
use crate::signer::SignerEntry;
use color_eyre::eyre::{ensure, WrapErr};
use color_eyre::Result;
use std::fs;
use std::path::PathBuf;

const PANO_REPO_URL: &str = "https://github.com/panoprotocol/pano";

const SETUP_SCRIPT_TEMPLATE: &str = r#"#!/usr/bin/env bash
set -e

DATA_DIR=$PWD/data

pano --datadir $DATA_DIR/pano init $PWD/genesis.json
"#;

const START_SCRIPT_TEMPLATE: &str = r#"#!/usr/bin/env bash
set -e

DATA_DIR=$PWD/data
BTTC_CHAIN_ID=

pano --datadir $DATA_DIR/pano \
  --networkid $BTTC_CHAIN_ID \
  --port 30303 \
  --http --http.addr 0.0.0.0 --http.port 8545 \
  --unlock {{ signer_address }} \
  --password $DATA_DIR/password.txt \
  --keystore $DATA_DIR/keystore \
  --allow-insecure-unlock \
  --mine
"#;

const CLEAN_SCRIPT_TEMPLATE: &str = r#"#!/usr/bin/env bash
set -e

rm -rf $PWD/data/pano
echo "pano chain data removed; run pano-setup.sh to reinitialize"
"#;

/// Single-node pano stage.
pub struct Pano<'a> {
    config: NetworkConfig,
    cloner: &'a dyn RepositoryCloner,
    runner: &'a dyn ProcessRunner,
    renderer: &'a dyn TemplateRenderer,
}

impl<'a> Pano<'a> {
    pub fn new(
        config: NetworkConfig,
        cloner: &'a dyn RepositoryCloner,
        runner: &'a dyn ProcessRunner,
        renderer: &'a dyn TemplateRenderer,
    ) -> Self {
        Self {
            config,
            cloner,
            runner,
            renderer,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.target_dir.join("data")
    }

    pub fn chain_data_dir(&self) -> PathBuf {
        self.data_dir().join("pano")
    }

    pub fn keystore_dir(&self) -> PathBuf {
        self.data_dir().join("keystore")
    }

    pub fn password_path(&self) -> PathBuf {
        self.data_dir().join("password.txt")
    }

    /// Assemble the single-node pipeline.
    pub fn tasks(&'a self) -> Pipeline<'a, ProvisionState> {
        let mut pipeline = Pipeline::new("pano");

        pipeline.push(Step::leaf("Generate primary account", move |state| {
            self.generate_primary_account(state)
        }));

        pipeline.push(Step::new("Set up genesis contracts", move |_| {
            Ok(StepOutcome::Nested(
                Genesis::new(&self.config, self.cloner, self.runner).into_tasks(),
            ))
        }));

        pipeline.push(Step::leaf("Clone pano repository", move |_| {
            self.cloner.clone_repo(
                "pano",
                &self.config.pano_branch,
                PANO_REPO_URL,
                &self.config.code_dir(),
            )?;
            Ok(())
        }));

        pipeline.push(Step::leaf("Build pano", move |_| {
            let repo_dir = self.config.code_dir().join("pano");
            self.runner.run("make", &["pano-all"], &repo_dir)?;
            Ok(())
        }));

        pipeline.push(Step::leaf("Prepare data directory", move |_| {
            fs::create_dir_all(self.chain_data_dir())?;
            fs::create_dir_all(self.keystore_dir())?;
            Ok(())
        }));

        pipeline.push(Step::leaf("Prepare keystore and password file", move |state| {
            self.write_primary_keystore(state)
        }));

        pipeline.push(Step::leaf("Copy genesis file", move |_| {
            let genesis = Genesis::new(&self.config, self.cloner, self.runner);
            fs::copy(
                genesis.genesis_file_path(),
                self.config.target_dir.join("genesis.json"),
            )
            .wrap_err("failed to copy generated genesis")?;
            Ok(())
        }));

        pipeline.push(Step::leaf("Render chain scripts", move |state| {
            self.render_scripts(state)
        }));

        pipeline
    }

    /// Generate the chain's primary account and record it as the sole
    /// genesis validator.
    pub fn generate_primary_account(&self, state: &mut ProvisionState) -> Result<()> {
        let keypair = NodeKeypair::generate()?;
        let entry = SignerEntry {
            address: keypair.address(),
            private_key: keypair.secret_hex(),
        };

        state.genesis_addresses = vec![entry.address_lower()];
        state.signers = vec![entry];
        Ok(())
    }

    fn write_primary_keystore(&self, state: &mut ProvisionState) -> Result<()> {
        ensure!(
            !state.signers.is_empty(),
            "primary account must be generated before the keystore"
        );

        let entry = &state.signers[0];
        let password = self.config.password_policy.password_for(0);

        fs::write(self.password_path(), format!("{}\n", password))?;
        let encrypted = keystore::encrypt(&entry.private_key, &password)?;
        keystore::write_keystore(&self.keystore_dir(), &encrypted)?;
        Ok(())
    }

    fn render_scripts(&self, state: &mut ProvisionState) -> Result<()> {
        ensure!(
            !state.signers.is_empty(),
            "primary account must be generated before script rendering"
        );

        let scripts = [
            ("pano-setup.sh", SETUP_SCRIPT_TEMPLATE),
            ("pano-start.sh", START_SCRIPT_TEMPLATE),
            ("pano-clean.sh", CLEAN_SCRIPT_TEMPLATE),
        ];

        let context = TemplateContext::for_node(0).with_signer(&state.signers[0]);

        for (name, body) in scripts {
            let template_path = self.config.target_dir.join(format!("{}.tmpl", name));
            fs::write(&template_path, body)?;

            let rendered = self.renderer.render(&template_path, &context)?;
            let out_path = self.config.target_dir.join(name);
            fs::write(&out_path, rendered)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(&out_path)?.permissions();
                perms.set_mode(0o755);
                fs::set_permissions(&out_path, perms)?;
            }

            fs::remove_file(&template_path)?;
        }

        let mut replacer =
            FileReplacer::open(self.config.target_dir.join("pano-start.sh"))?;
        replacer.set(
            FieldKey::bare("BTTC_CHAIN_ID"),
            &self.config.pano_chain_id.to_string(),
        )?;
        replacer.save()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{BuildError, ProcessOutput, ProcessRunner, VarRenderer};
    use crate::topology::Topology;
    use std::path::Path;

    struct NoopRunner;

    impl ProcessRunner for NoopRunner {
        fn run(
            &self,
            _command: &str,
            _args: &[&str],
            _cwd: &Path,
        ) -> Result<ProcessOutput, BuildError> {
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    struct NoopCloner;

    impl RepositoryCloner for NoopCloner {
        fn clone_repo(
            &self,
            _name: &str,
            _branch: &str,
            _url: &str,
            _dest_dir: &Path,
        ) -> Result<(), crate::external::CloneError> {
            Ok(())
        }
    }

    fn pano_config(target_dir: PathBuf) -> NetworkConfig {
        let mut config = crate::config::tests::base_config();
        config.validator_count = 1;
        config.non_validator_count = 0;
        config.topology = Topology::Colocated;
        config.target_dir = target_dir;
        config.resolve_hosts();
        config
    }

    #[test]
    fn test_primary_account_feeds_genesis_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let runner = NoopRunner;
        let cloner = NoopCloner;
        let pano = Pano::new(
            pano_config(dir.path().to_path_buf()),
            &cloner,
            &runner,
            &VarRenderer,
        );

        let mut state = ProvisionState::default();
        pano.generate_primary_account(&mut state).unwrap();

        assert_eq!(state.signers.len(), 1);
        assert_eq!(state.genesis_addresses.len(), 1);
        assert_eq!(
            state.genesis_addresses[0],
            state.signers[0].address_lower()
        );
    }

    #[test]
    fn test_keystore_and_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = NoopRunner;
        let cloner = NoopCloner;
        let pano = Pano::new(
            pano_config(dir.path().to_path_buf()),
            &cloner,
            &runner,
            &VarRenderer,
        );

        let mut state = ProvisionState::default();
        pano.generate_primary_account(&mut state).unwrap();

        fs::create_dir_all(pano.keystore_dir()).unwrap();
        pano.write_primary_keystore(&mut state).unwrap();
        assert!(pano.password_path().exists());
        assert_eq!(fs::read_dir(pano.keystore_dir()).unwrap().count(), 1);

        pano.render_scripts(&mut state).unwrap();
        let start = fs::read_to_string(dir.path().join("pano-start.sh")).unwrap();
        assert!(start.contains("BTTC_CHAIN_ID=1029"));
        assert!(start.contains(&state.signers[0].address_lower()));
        assert!(dir.path().join("pano-clean.sh").exists());
        // Template files are removed after rendering.
        assert!(!dir.path().join("pano-start.sh.tmpl").exists());
    }
}
