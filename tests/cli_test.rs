use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::{PathBuf,Path};
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

// Write some text with enough repetition to compress well.
// The text is generated so that the test does not depend on newline handling in the repository.
fn make_text(temp_dir: &tempfile::TempDir,name: &str,lines: usize) -> Result<PathBuf,Box<dyn std::error::Error>> {
    let mut txt = String::new();
    for i in 0..lines {
        txt += &format!("line {} of the section, the firmware volume holds {} files\r\n",i,i % 7);
    }
    let path = temp_dir.path().join(name);
    std::fs::write(&path,txt)?;
    Ok(path)
}

// Make a copy in temporary directory with CRLF newlines, the reference outputs were made that way.
// This insulates us against newline substitutions inserted by git or other layers.
fn copy_and_fix_newlines(in_file: PathBuf,temp_dir: &tempfile::TempDir) -> Result<PathBuf,Box<dyn std::error::Error>> {
    let txt = std::fs::read(in_file)?;
    let mut new_txt: Vec<u8> = Vec::new();
    let mut last_char: u8 = 255;
    for i in 0..txt.len() {
        if txt[i]==13 || txt[i]==10 && last_char!=13 {
            new_txt.extend_from_slice(&[13,10]);
        }
        else if txt[i]!=10 {
            new_txt.push(txt[i]);
        }
        last_char = txt[i];
    }
    let new_txt_path = temp_dir.path().join("converted.txt");
    std::fs::write(&new_txt_path,new_txt)?;
    Ok(new_txt_path)
}

fn compress_test(base_name: &str,method: &str) -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path_any_newline = Path::new("tests").join([base_name,".txt"].concat());
    let in_path = copy_and_fix_newlines(in_path_any_newline,&temp_dir)?;
    let cmp_path = Path::new("tests").join([base_name,".",method].concat());
    let out_path = temp_dir.path().join([base_name,".",method].concat());
    Command::cargo_bin("tianocompress")?
        .arg("compress")
        .arg("-m").arg(method)
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    match (std::fs::read(cmp_path),std::fs::read(out_path)) {
        (Ok(v1),Ok(v2)) => {
            assert_eq!(v1.len(),v2.len());
            assert_eq!(v1,v2);
        },
        _ => panic!("unable to compare output with reference")
    }
    Ok(())
}

fn expand_test(base_name: &str,method: &str) -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = Path::new("tests").join([base_name,".",method].concat());
    let cmp_path_any_newline = Path::new("tests").join([base_name,".txt"].concat());
    let cmp_path = copy_and_fix_newlines(cmp_path_any_newline,&temp_dir)?;
    let out_path = temp_dir.path().join([base_name,".txt"].concat());
    Command::cargo_bin("tianocompress")?
        .arg("expand")
        .arg("-m").arg(method)
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    match (std::fs::read(cmp_path),std::fs::read(out_path)) {
        (Ok(v1),Ok(v2)) => {
            assert_eq!(v1,v2);
        },
        _ => panic!("unable to compare output with reference")
    }
    Ok(())
}

// The inventory is about 110K, which slides the EFI window and sends several blocks in both formats.

#[test]
fn efi_compression() -> STDRESULT {
    compress_test("fv_inventory","efi")
}

#[test]
fn efi_expansion() -> STDRESULT {
    expand_test("fv_inventory","efi")
}

#[test]
fn tiano_compression() -> STDRESULT {
    compress_test("fv_inventory","tiano")
}

#[test]
fn tiano_expansion() -> STDRESULT {
    expand_test("fv_inventory","tiano")
}

fn round_trip_test(method: &str,lines: usize) -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = make_text(&temp_dir,"original.txt",lines)?;
    let cmp_path = temp_dir.path().join("compressed.bin");
    let out_path = temp_dir.path().join("expanded.txt");
    Command::cargo_bin("tianocompress")?
        .arg("compress")
        .arg("-m").arg(method)
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&cmp_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("compressed"));
    Command::cargo_bin("tianocompress")?
        .arg("expand")
        .arg("-m").arg(method)
        .arg("-i").arg(&cmp_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    let original = std::fs::read(in_path)?;
    let compressed = std::fs::read(cmp_path)?;
    let expanded = std::fs::read(out_path)?;
    assert!(compressed.len() < original.len());
    // header gives the payload size and original size
    assert_eq!(u32::from_le_bytes([compressed[0],compressed[1],compressed[2],compressed[3]]) as usize,compressed.len()-8);
    assert_eq!(u32::from_le_bytes([compressed[4],compressed[5],compressed[6],compressed[7]]) as usize,original.len());
    assert_eq!(original,expanded);
    Ok(())
}

#[test]
fn efi_round_trip() -> STDRESULT {
    round_trip_test("efi",500)
}

#[test]
fn tiano_round_trip() -> STDRESULT {
    round_trip_test("tiano",500)
}

#[test]
fn small_file() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("ab.txt");
    let out_path = temp_dir.path().join("ab.bin");
    std::fs::write(&in_path,"AB")?;
    Command::cargo_bin("tianocompress")?
        .arg("compress")
        .arg("-m").arg("efi")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    let expected = hex::decode("0A000000020000000002200424 30B7004000".replace(" ",""))?;
    assert_eq!(std::fs::read(out_path)?,expected);
    Ok(())
}

#[test]
fn garbage_rejected() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("garbage.bin");
    let out_path = temp_dir.path().join("garbage.txt");
    std::fs::write(&in_path,[0x10,0,0,0,0x40,0,0,0,0xff,0xff,0xff])?;
    Command::cargo_bin("tianocompress")?
        .arg("expand")
        .arg("-m").arg("efi")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("FileFormatMismatch"));
    assert!(!out_path.exists());
    Ok(())
}

#[test]
fn unknown_method() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = make_text(&temp_dir,"original.txt",5)?;
    Command::cargo_bin("tianocompress")?
        .arg("compress")
        .arg("-m").arg("lzw")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(temp_dir.path().join("out.bin"))
        .assert()
        .failure();
    Ok(())
}
