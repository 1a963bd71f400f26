use assert_cmd::Command;
use assert_cmd::prelude::OutputOkExt;
use itertools::Itertools;
use std::fs;
use std::path::Path;

const BOMBENCH_NAME: &str = env!("CARGO_PKG_NAME");

#[test]
fn test_no_arguments() {
    Command::cargo_bin(BOMBENCH_NAME)
        .unwrap()
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_unknown_tool() {
    Command::cargo_bin(BOMBENCH_NAME)
        .unwrap()
        .args(["run", "-s", "subjects.txt", "-t", "syft,grype"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_subject_list_non_existent() {
    let temp = assert_fs::TempDir::new().unwrap();
    let output = Command::cargo_bin(BOMBENCH_NAME)
        .unwrap()
        .arg("run")
        .arg("-s")
        .arg(temp.path().join("non-existent.txt"))
        .arg("-w")
        .arg(temp.path())
        .arg("--skip-preflight")
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("non-existent.txt"), "{}", stderr);
    assert!(!temp.path().join("result.csv").exists());
    temp.close().unwrap();
}

#[test]
fn test_missing_programs_stop_the_run() {
    let temp = assert_fs::TempDir::new().unwrap();
    let subjects = temp.path().join("subjects.txt");
    fs::write(&subjects, "express,https://github.com/expressjs/express.git\n").unwrap();
    let config = temp.path().join("bench.toml");
    fs::write(
        &config,
        "git = \"/nowhere/git\"\n[tools]\nsyft = \"/nowhere/syft\"\n",
    )
    .unwrap();

    let output = Command::cargo_bin(BOMBENCH_NAME)
        .unwrap()
        .arg("run")
        .arg("-s")
        .arg(&subjects)
        .arg("-w")
        .arg(temp.path())
        .arg("-t")
        .arg("syft")
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("required programs not found"), "{}", stderr);
    assert!(stderr.contains("/nowhere/git"), "{}", stderr);
    assert!(stderr.contains("/nowhere/syft"), "{}", stderr);
    assert!(!temp.path().join("result.csv").exists());
    temp.close().unwrap();
}

#[test]
fn test_upload_without_documents() {
    let temp = assert_fs::TempDir::new().unwrap();
    let output = Command::cargo_bin(BOMBENCH_NAME)
        .unwrap()
        .env("BOMBENCH_DTRACK_API_KEY", "secret")
        .arg("upload")
        .arg("-w")
        .arg(temp.path())
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("no SBOM documents"), "{}", stderr);
    temp.close().unwrap();
}

#[cfg(unix)]
mod fake_tools {
    use super::*;
    use serde_cyclonedx::cyclonedx::v_1_6::{ComponentBuilder, CycloneDxBuilder, Metadata};
    use std::os::unix::fs::PermissionsExt;

    /// Writes an executable shell script and returns its path.
    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn fixture_document(path: &Path, components: usize) {
        let components = (0..components)
            .map(|i| {
                ComponentBuilder::default()
                    .type_("Library".to_string())
                    .name(format!("component-{}", i))
                    .version("1.0.0")
                    .build()
                    .unwrap()
            })
            .collect_vec();
        let cdx = CycloneDxBuilder::default()
            .bom_format("CycloneDX")
            .spec_version("1.6")
            .version(1)
            .serial_number("urn:uuid:3e671687-395b-41f5-a30f-a58921a69b79")
            .metadata(Metadata::default())
            .components(components)
            .build()
            .unwrap();
        fs::write(path, serde_json::to_string_pretty(&cdx).unwrap()).unwrap();
    }

    /// A fake git that "clones" by creating the `.git` marker, refuses any
    /// locator containing `unreachable`, and logs successful clones; three
    /// generators that copy the fixture to wherever their arguments say; and
    /// a scorer that reports a score and a grade but no component count.
    fn fake_bench(bin: &Path) -> std::path::PathBuf {
        let fixture = bin.join("fixture.cdx.json");
        fixture_document(&fixture, 37);
        let clones = bin.join("clones.log");

        let git = script(
            bin,
            "git",
            &format!(
                "case \"$4\" in *unreachable*) echo 'fatal: repository not found' >&2; exit 128;; esac\n\
                 mkdir -p \"$5/.git\" && echo \"$4\" >> '{}'",
                clones.display()
            ),
        );
        let generator = format!(
            "out=''\nprev=''\nfor a in \"$@\"; do\n\
             case \"$prev\" in -o|--output) out=\"$a\";; esac\n\
             case \"$a\" in cyclonedx-json=*) out=\"${{a#cyclonedx-json=}}\";; esac\n\
             prev=\"$a\"\ndone\n\
             cp '{}' \"$out\"",
            fixture.display()
        );
        let syft = script(bin, "syft", &generator);
        let trivy = script(bin, "trivy", &generator);
        let cdxgen = script(bin, "cdxgen", &generator);
        let sbomqs = script(
            bin,
            "sbomqs",
            "echo 'SBOM Quality Score: 7.5/10.0  Grade: B'",
        );

        let config = bin.join("bench.toml");
        fs::write(
            &config,
            format!(
                "git = \"{}\"\n\n[tools]\nsyft = \"{}\"\ntrivy = \"{}\"\ncdxgen = \"{}\"\n\n[scorer]\nprogram = \"{}\"\n",
                git, syft, trivy, cdxgen, sbomqs
            ),
        )
        .unwrap();
        config
    }

    fn run(workspace: &Path, subjects: &Path, config: &Path) -> Vec<String> {
        let command_output = Command::cargo_bin(BOMBENCH_NAME)
            .unwrap()
            .arg("run")
            .arg("-s")
            .arg(subjects)
            .arg("-w")
            .arg(workspace)
            .arg("-c")
            .arg(config)
            .assert()
            .success()
            .get_output()
            .clone()
            .unwrap();
        let output = String::from_utf8(command_output.stdout).unwrap();
        // the path of the result table is the last line of the stdout
        let result = output.lines().last().unwrap().to_string();
        fs::read_to_string(result)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect_vec()
    }

    #[test]
    fn test_repo_benchmark() {
        let bin = assert_fs::TempDir::new().unwrap();
        let workspace = assert_fs::TempDir::new().unwrap();
        let config = fake_bench(bin.path());
        let subjects = workspace.path().join("subjects.txt");
        fs::write(
            &subjects,
            "express,https://github.com/expressjs/express.git\n\
             \n\
             # comment\n\
             ghost,https://example.invalid/unreachable.git\n\
             https://github.com/lodash/lodash.git\n",
        )
        .unwrap();

        let lines = run(workspace.path(), &subjects, &config);
        assert_eq!(lines.len(), 3 * 3 + 1);
        assert_eq!(
            lines[0],
            "subject,tool,generation_elapsed_seconds,quality_score,grade,component_count"
        );
        let express = lines
            .iter()
            .filter(|line| line.starts_with("express,"))
            .collect_vec();
        assert_eq!(express.len(), 3);
        for (line, tool) in express.iter().zip(["syft", "trivy", "cdxgen"]) {
            let cells = line.split(',').collect_vec();
            assert_eq!(cells[1], tool);
            assert!(!cells[2].is_empty());
            assert_eq!(cells[3], "7.5000");
            assert_eq!(cells[4], "B");
            assert_eq!(cells[5], "37");
        }
        for tool in ["syft", "trivy", "cdxgen"] {
            assert!(lines.contains(&format!("ghost,{},,,,", tool)), "{:?}", lines);
        }
        assert_eq!(
            lines.iter().filter(|line| line.starts_with("lodash,")).count(),
            3
        );
        assert!(
            workspace
                .path()
                .join("sboms/repo/express.cdxgen.cdx.json")
                .is_file()
        );
        assert!(
            workspace
                .path()
                .join("logs/repo/ghost__git_clone.log")
                .is_file()
        );
        assert!(
            workspace
                .path()
                .join("logs/repo/lodash__syft.score.log")
                .is_file()
        );

        workspace.close().unwrap();
        bin.close().unwrap();
    }

    #[test]
    fn test_parent_directory_name_keeps_the_workspace() {
        let bin = assert_fs::TempDir::new().unwrap();
        let workspace = assert_fs::TempDir::new().unwrap();
        let config = fake_bench(bin.path());
        let subjects = workspace.path().join("subjects.txt");
        fs::write(&subjects, "..,https://github.com/expressjs/express.git\n").unwrap();
        fs::create_dir_all(workspace.path().join("repos")).unwrap();

        let lines = run(workspace.path(), &subjects, &config);
        assert_eq!(lines.len(), 3 + 1);
        assert!(lines[1].starts_with("express,syft,"), "{:?}", lines);
        assert!(subjects.is_file());
        assert!(workspace.path().join("repos/express/.git").is_dir());

        workspace.close().unwrap();
        bin.close().unwrap();
    }

    #[test]
    fn test_rerun_reuses_checkouts_and_replaces_results() {
        let bin = assert_fs::TempDir::new().unwrap();
        let workspace = assert_fs::TempDir::new().unwrap();
        let config = fake_bench(bin.path());
        let subjects = workspace.path().join("subjects.txt");
        fs::write(
            &subjects,
            "express,https://github.com/expressjs/express.git\nlodash,https://github.com/lodash/lodash.git\n",
        )
        .unwrap();

        let first = run(workspace.path(), &subjects, &config);
        let second = run(workspace.path(), &subjects, &config);
        assert_eq!(first.len(), 2 * 3 + 1);
        assert_eq!(second.len(), 2 * 3 + 1);

        let clones = fs::read_to_string(bin.path().join("clones.log")).unwrap();
        assert_eq!(clones.lines().count(), 2);

        workspace.close().unwrap();
        bin.close().unwrap();
    }
}
