use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::PathBuf;

fn kvmcli() -> assert_cmd::Command {
    cargo_bin_cmd!("kvmcli").into()
}

struct Env {
    dir: tempfile::TempDir,
    config: PathBuf,
}

impl Env {
    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

fn write_test_config(images_path: bool) -> Env {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("artifacts")).unwrap();
    std::fs::write(root.join("artifacts/rocky9.1.qcow2"), b"rocky base image").unwrap();

    let images_line = if images_path {
        format!("images_path = \"{}\"\n", root.join("images").display())
    } else {
        String::new()
    };
    let config = root.join("kvmcli.toml");
    std::fs::write(
        &config,
        format!(
            r#"
yaml_path = "{yaml}"
template_name = "{template}"

[image]
artifacts_path = "{artifacts}"
{images_line}image_name = "kvm"

[hardware]
ram = 2048
cpus = 2
sound_type = "none"
rng_device = "/dev/urandom"

[network]
mac_address = "02:A3:10:00:00:01"
bridge_name = "virbr0"

[disk]
size_gb = 20

[platform]
virtualization_type = "kvm"
"#,
            yaml = root.join("servers.yml").display(),
            template = root.join("template.yml").display(),
            artifacts = root.join("artifacts").display(),
        ),
    )
    .unwrap();

    Env { dir, config }
}

const SERVERS: &str = r#"
version: 1.0
vms:
  - info:
      image: rocky9.1
    storage:
      disk:
        format: qcow2
        size: 30
  - info:
      name: no-format
      image: rocky9.1
  - info:
      name: web-1
      image: rocky9.1
      ram: 1536
      os: rocky9
    storage:
      disk:
        format: qcow2
"#;

fn config_arg(env: &Env) -> [&str; 2] {
    ["--config", env.config.to_str().unwrap()]
}

#[test]
fn help_works() {
    kvmcli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provision KVM virtual machines"));
}

#[test]
fn missing_config_shows_error() {
    kvmcli()
        .args(["--config", "/nonexistent/kvmcli.toml", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn info_prints_resolved_table() {
    let env = write_test_config(true);
    env.write("servers.yml", SERVERS);

    kvmcli()
        .args(config_arg(&env))
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("MAC ADDRESS"))
        .stdout(predicate::str::contains("kvm-1"))
        .stdout(predicate::str::contains("1536 MB"))
        .stdout(predicate::str::contains("missing required field `storage.disk.format`"));
}

#[test]
fn info_rejects_malformed_batch() {
    let env = write_test_config(true);
    let batch = env.write("broken.yml", "vms: [\n  - info: {");

    kvmcli()
        .args(config_arg(&env))
        .arg("info")
        .arg(&batch)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse declarations"));
}

#[test]
fn apply_stage_only_copies_images_and_continues_past_failures() {
    let env = write_test_config(true);
    env.write("servers.yml", SERVERS);

    kvmcli()
        .args(config_arg(&env))
        .args(["apply", "--stage-only"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("no-format"))
        .stdout(predicate::str::contains("unresolved"))
        .stderr(predicate::str::contains("1 of 3 VMs were not provisioned"));

    assert_eq!(
        std::fs::read(env.path("images/kvm-1.qcow2")).unwrap(),
        b"rocky base image"
    );
    assert!(env.path("images/web-1.qcow2").exists());
    assert!(!env.path("images/no-format.qcow2").exists());
}

#[test]
fn apply_rerun_reports_already_staged() {
    let env = write_test_config(true);
    env.write(
        "servers.yml",
        "vms:\n  - info:\n      image: rocky9.1\n    storage:\n      disk:\n        format: qcow2\n",
    );

    for _ in 0..2 {
        kvmcli()
            .args(config_arg(&env))
            .args(["apply", "--stage-only"])
            .assert()
            .success();
    }

    kvmcli()
        .args(config_arg(&env))
        .args(["apply", "--stage-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already staged"));
}

#[test]
fn apply_json_describes_handoff() {
    let env = write_test_config(true);
    env.write(
        "servers.yml",
        "vms:\n  - info:\n      image: rocky9.1\n    storage:\n      disk:\n        format: qcow2\n    provisioner:\n      playbook: site.yml\n",
    );

    kvmcli()
        .args(config_arg(&env))
        .args(["apply", "--json", "--virt-install", "true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\""))
        .stdout(predicate::str::contains("provisioned"))
        .stdout(predicate::str::contains("kvm-1.qcow2"))
        .stdout(predicate::str::contains("site.yml"));
}

#[test]
fn apply_without_images_path_is_fatal() {
    let env = write_test_config(false);
    env.write("servers.yml", SERVERS);

    kvmcli()
        .args(config_arg(&env))
        .args(["apply", "--stage-only"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("images_path is not set"));

    assert!(!env.path("images").exists());
}

#[test]
fn init_writes_template_once() {
    let env = write_test_config(true);

    kvmcli()
        .args(config_arg(&env))
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));
    assert!(env.path("template.yml").exists());

    kvmcli()
        .args(config_arg(&env))
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn init_warns_about_broken_config_and_uses_default_path() {
    let env = write_test_config(true);
    let config = env.write("broken.toml", "[image\nartifacts_path = ");

    kvmcli()
        .current_dir(env.dir.path())
        .args(["--config", config.to_str().unwrap(), "init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("ignoring unreadable config"));
    assert!(env.path("servers.yml").exists());
    assert!(!env.path("template.yml").exists());
}
