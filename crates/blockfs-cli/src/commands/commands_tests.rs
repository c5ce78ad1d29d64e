use blockfs::{Geometry, MemStore, VolumeSession};

use super::*;

fn session() -> VolumeSession<MemStore> {
    VolumeSession::format(MemStore::new(Geometry::new("cli", 2048 * 512, 512))).expect("format")
}

fn run(session: &mut VolumeSession<MemStore>, command: FsCommand) -> Result<String> {
    let mut out = Vec::new();
    execute(session, &command, &mut out)?;
    Ok(String::from_utf8(out).expect("utf8 output"))
}

fn name(value: &str) -> String {
    value.to_string()
}

#[test]
fn lsfs_reports_layout() {
    let mut session = session();
    let text = run(&mut session, FsCommand::Lsfs).expect("lsfs");
    assert!(text.contains("volume name:       cli"));
    assert!(text.contains("inodes:            1 / 509"));
    assert!(text.contains("data at:           147"));
}

#[test]
fn mkdir_then_ls() {
    let mut session = session();
    run(&mut session, FsCommand::Mkdir { name: name("docs") }).expect("mkdir");
    let text = run(&mut session, FsCommand::Ls).expect("ls");
    let first = text.lines().next().expect("row");
    assert!(first.starts_with("dir "));
    assert!(first.ends_with(" docs"));
    assert!(text.contains("1 entries"));
}

#[test]
fn errors_carry_the_command() {
    let mut session = session();
    run(&mut session, FsCommand::Mkdir { name: name("docs") }).expect("mkdir");
    let err = run(&mut session, FsCommand::Mkdir { name: name("docs") }).expect_err("duplicate");
    let message = format!("{err:#}");
    assert!(message.starts_with("mkdir docs"), "{message}");
    assert!(message.contains("already exists"), "{message}");

    let err = run(&mut session, FsCommand::Cat { name: name("nope") }).expect_err("missing");
    assert!(format!("{err:#}").starts_with("cat nope"));
}

#[test]
fn host_copy_cat_and_copy_out() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let source = dir.path().join("notes.txt");
    std::fs::write(&source, b"line one\nline two\n").expect("host write");

    let mut session = session();
    let text = run(
        &mut session,
        FsCommand::Cpin {
            host: source.clone(),
            name: name("notes"),
        },
    )
    .expect("cpin");
    assert!(text.starts_with("imported 18 bytes sha256 "));

    let text = run(&mut session, FsCommand::Cat { name: name("notes") }).expect("cat");
    assert_eq!(text, "line one\nline two\n");

    run(
        &mut session,
        FsCommand::Cp {
            src: name("notes"),
            dst: name("copy"),
        },
    )
    .expect("cp");
    run(
        &mut session,
        FsCommand::Mv {
            src: name("copy"),
            dst: name("moved"),
        },
    )
    .expect("mv");

    let target = dir.path().join("out.txt");
    let text = run(
        &mut session,
        FsCommand::Cpout {
            name: name("moved"),
            host: target.clone(),
        },
    )
    .expect("cpout");
    assert!(text.starts_with("exported 18 bytes"));
    assert_eq!(
        std::fs::read(&target).expect("host read"),
        b"line one\nline two\n"
    );

    run(&mut session, FsCommand::Del { name: name("moved") }).expect("del");
    let text = run(&mut session, FsCommand::Ls).expect("ls");
    assert!(!text.contains("moved"));
}

#[test]
fn format_wipes_volume() {
    let mut session = session();
    run(&mut session, FsCommand::Mkdir { name: name("docs") }).expect("mkdir");
    run(&mut session, FsCommand::Rmdir { name: name("docs") }).expect("rmdir");
    run(&mut session, FsCommand::Mkdir { name: name("keep") }).expect("mkdir");
    run(&mut session, FsCommand::Format { yes: true }).expect("format");
    let text = run(&mut session, FsCommand::Ls).expect("ls");
    assert_eq!(text, "0 entries\n");
}
