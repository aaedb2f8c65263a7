//! DNS-01 provider that shells out to operator-supplied scripts.
//!
//! The create/delete commands receive the computed record name and TXT value
//! appended as their final two arguments, acme.sh hook style. Each
//! invocation runs under a deadline so a hung script cannot stall the
//! orchestrator.

use std::{collections::HashMap, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ProviderError;

use super::{dns01_record_name, dns01_txt_value, ChallengeProvider, ChallengeType};

/// Runs external create/delete commands to manage challenge TXT records.
#[derive(Debug)]
pub struct ScriptProvider {
    create_command: Vec<String>,
    delete_command: Vec<String>,
    environment: HashMap<String, String>,
    timeout: Duration,
}

impl ScriptProvider {
    pub fn new(
        create_command: Vec<String>,
        delete_command: Vec<String>,
        environment: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if create_command.is_empty() || delete_command.is_empty() {
            return Err(ProviderError::Configuration(
                "script provider requires non-empty create and delete commands".to_owned(),
            ));
        }

        Ok(ScriptProvider {
            create_command,
            delete_command,
            environment,
            timeout,
        })
    }

    async fn run(
        &self,
        command: &[String],
        record_name: &str,
        record_value: &str,
    ) -> Result<(), ProviderError> {
        let program = &command[0];

        let mut cmd = Command::new(program);
        cmd.args(&command[1..])
            .arg(record_name)
            .arg(record_value)
            .envs(&self.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            log::error!("dns script '{program}' failed ({}): {stderr}", output.status);
            return Err(ProviderError::Script {
                program: program.clone(),
                code: output.status.code(),
                stderr,
            });
        }

        log::debug!(
            "dns script '{program}' output: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );

        Ok(())
    }
}

#[async_trait]
impl ChallengeProvider for ScriptProvider {
    fn name(&self) -> &'static str {
        "dns-01 script"
    }

    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Dns01
    }

    async fn provision(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<(), ProviderError> {
        let record_name = dns01_record_name(domain);
        let record_value = dns01_txt_value(key_auth);

        log::info!("creating TXT record {record_name} via script");
        self.run(&self.create_command, &record_name, &record_value)
            .await
    }

    async fn deprovision(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<(), ProviderError> {
        let record_name = dns01_record_name(domain);
        let record_value = dns01_txt_value(key_auth);

        log::info!("deleting TXT record {record_name} via script");
        self.run(&self.delete_command, &record_name, &record_value)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `sh -c SCRIPT hook name value` exposes record name/value as $1/$2.
    fn sh_args(script: &str) -> Vec<String> {
        vec![
            "sh".to_owned(),
            "-c".to_owned(),
            script.to_owned(),
            "hook".to_owned(),
        ]
    }

    #[tokio::test]
    async fn provision_and_deprovision_roundtrip_through_a_file_backend() {
        let dir = std::env::temp_dir().join(format!("certkeep-script-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let zone = dir.join("zone.txt");
        let zone_str = zone.to_str().unwrap();

        // the "DNS backend" is a flat file of "name value" lines
        let provider = ScriptProvider::new(
            sh_args(&format!("echo \"$1 $2\" >> {zone_str}")),
            sh_args(&format!(
                "grep -v \"^$1 \" {zone_str} > {zone_str}.new || true; mv {zone_str}.new {zone_str}"
            )),
            HashMap::new(),
            Duration::from_secs(10),
        )
        .unwrap();

        provider
            .provision("example.com", "tok", "tok.thumbprint")
            .await
            .unwrap();

        let expected_name = dns01_record_name("example.com");
        let expected_value = dns01_txt_value("tok.thumbprint");
        let contents = std::fs::read_to_string(&zone).unwrap();
        assert!(contents.contains(&format!("{expected_name} {expected_value}")));

        provider
            .deprovision("example.com", "tok", "tok.thumbprint")
            .await
            .unwrap();
        let contents = std::fs::read_to_string(&zone).unwrap();
        assert!(!contents.contains(&expected_name));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_stderr() {
        let provider = ScriptProvider::new(
            sh_args("echo \"zone not managed\" >&2; exit 3"),
            sh_args("true"),
            HashMap::new(),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = provider
            .provision("example.com", "tok", "auth")
            .await
            .unwrap_err();

        match err {
            ProviderError::Script { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("zone not managed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn hung_script_hits_the_deadline() {
        let provider = ScriptProvider::new(
            sh_args("sleep 30"),
            sh_args("true"),
            HashMap::new(),
            Duration::from_millis(100),
        )
        .unwrap();

        let err = provider
            .provision("example.com", "tok", "auth")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[test]
    fn empty_command_is_a_configuration_error() {
        let err = ScriptProvider::new(
            Vec::new(),
            sh_args("true"),
            HashMap::new(),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
