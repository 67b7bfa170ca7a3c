//! Smoke tests -- verify the binary runs and rejects bad parameters.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "CPU, memory, and network stress testing",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("stresskit"));
}

#[test]
fn test_cpu_subcommand_exists() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .args(["cpu", "--help"])
        .assert()
        .success();
}

#[test]
fn test_ram_subcommand_exists() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .args(["ram", "--help"])
        .assert()
        .success();
}

#[test]
fn test_network_subcommand_exists() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .args(["network", "--help"])
        .assert()
        .success();
}

#[test]
fn test_invalid_network_mode_exits_with_config_code() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .args(["network", "--mode", "proxy", "--duration", "1"])
        .assert()
        .code(2)
        .stderr(predicates::str::contains("invalid network mode"));
}

#[test]
fn test_zero_duration_exits_with_config_code() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .args(["cpu", "--cores", "1", "--duration", "0"])
        .assert()
        .code(2)
        .stderr(predicates::str::contains("duration"));
}

#[test]
fn test_short_cpu_run_prints_summary() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .args(["cpu", "--cores", "1", "--duration", "1"])
        .assert()
        .success()
        .stdout(predicates::str::contains("CPU STRESS RUN SUMMARY"))
        .stdout(predicates::str::contains("Total primes found"));
}

#[test]
fn test_short_cpu_run_json_output() {
    Command::cargo_bin("stresskit")
        .unwrap()
        .args(["cpu", "--cores", "1", "--duration", "1", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::contains("\"kind\": \"cpu\""))
        .stdout(predicates::str::contains("\"outcome\": \"completed\""));
}
