use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

fn sample_data() -> Vec<u8> {
    let phrase = b"I am Sam. Sam I am. I do not like this Sam I am.\n";
    let mut ans = Vec::new();
    while ans.len() < 10000 {
        ans.extend_from_slice(phrase);
    }
    ans
}

#[test]
fn roundtrip_through_files() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let orig_path = temp_dir.path().join("sample.txt");
    let lz_path = temp_dir.path().join("sample.lz");
    let back_path = temp_dir.path().join("sample_back.txt");
    std::fs::write(&orig_path,sample_data())?;

    let mut cmd = Command::cargo_bin("lzpack")?;
    cmd.arg("compress")
        .arg("-i").arg(&orig_path)
        .arg("-o").arg(&lz_path)
        .assert()
        .success();
    let compressed = std::fs::read(&lz_path)?;
    assert!(compressed.len() < sample_data().len());

    let mut cmd = Command::cargo_bin("lzpack")?;
    cmd.arg("expand")
        .arg("-i").arg(&lz_path)
        .arg("-o").arg(&back_path)
        .assert()
        .success();
    match (std::fs::read(&orig_path),std::fs::read(&back_path)) {
        (Ok(v1),Ok(v2)) => {
            assert_eq!(v1,v2);
        },
        _ => panic!("unable to compare output with reference")
    }
    Ok(())
}

#[test]
fn roundtrip_with_custom_sizes() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let orig_path = temp_dir.path().join("sample.txt");
    let lz_path = temp_dir.path().join("sample.lz");
    let back_path = temp_dir.path().join("sample_back.txt");
    std::fs::write(&orig_path,sample_data())?;

    let mut cmd = Command::cargo_bin("lzpack")?;
    cmd.arg("compress")
        .arg("-w").arg("1024")
        .arg("-l").arg("64")
        .arg("-i").arg(&orig_path)
        .arg("-o").arg(&lz_path)
        .assert()
        .success();

    let mut cmd = Command::cargo_bin("lzpack")?;
    cmd.arg("expand")
        .arg("-i").arg(&lz_path)
        .arg("-o").arg(&back_path)
        .assert()
        .success();
    assert_eq!(std::fs::read(&orig_path)?,std::fs::read(&back_path)?);
    Ok(())
}

#[test]
fn refuses_to_overwrite_without_force() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let orig_path = temp_dir.path().join("sample.txt");
    let lz_path = temp_dir.path().join("sample.lz");
    std::fs::write(&orig_path,sample_data())?;
    std::fs::write(&lz_path,"already here")?;

    let mut cmd = Command::cargo_bin("lzpack")?;
    cmd.arg("compress")
        .arg("-i").arg(&orig_path)
        .arg("-o").arg(&lz_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("exists"));

    let mut cmd = Command::cargo_bin("lzpack")?;
    cmd.arg("compress")
        .arg("-f")
        .arg("-i").arg(&orig_path)
        .arg("-o").arg(&lz_path)
        .assert()
        .success();
    Ok(())
}

#[test]
fn rejects_garbage_input() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let bad_path = temp_dir.path().join("garbage.lz");
    let out_path = temp_dir.path().join("out.txt");
    std::fs::write(&bad_path,"this is not a compressed stream")?;

    let mut cmd = Command::cargo_bin("lzpack")?;
    cmd.arg("expand")
        .arg("-i").arg(&bad_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure();
    Ok(())
}
