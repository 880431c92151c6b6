//! Target classification (§4.6, §9 redesign flag): a pure function from a
//! sample's path and leading bytes to an `ExecPlan`, replacing the source's
//! dynamic dispatch on file type with a tagged variant built once.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecPlan {
    Interpreter { cmd: String, args: Vec<String> },
    Direct(PathBuf),
}

const ELF_MAGIC: &[u8] = b"\x7fELF";

pub fn classify(path: &Path, data: &[u8]) -> ExecPlan {
    if data.starts_with(ELF_MAGIC) {
        return ExecPlan::Direct(path.to_path_buf());
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        match ext {
            "py" => return interpreter("python3", path),
            "js" => return interpreter("node", path),
            "sh" => return interpreter("sh", path),
            _ => {}
        }
    }
    if let Some(cmd) = shebang_command(data) {
        return interpreter(&cmd, path);
    }
    interpreter("sh", path)
}

fn interpreter(cmd: &str, path: &Path) -> ExecPlan {
    ExecPlan::Interpreter {
        cmd: cmd.to_string(),
        args: vec![path.display().to_string()],
    }
}

fn shebang_command(data: &[u8]) -> Option<String> {
    if !data.starts_with(b"#!") {
        return None;
    }
    let line_end = data.iter().position(|&b| b == b'\n').unwrap_or(data.len());
    let line = std::str::from_utf8(&data[2..line_end]).ok()?;
    line.split_whitespace().next().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_extension_uses_python3() {
        let plan = classify(Path::new("sample.py"), b"print('hi')\n");
        assert_eq!(
            plan,
            ExecPlan::Interpreter { cmd: "python3".into(), args: vec!["sample.py".into()] }
        );
    }

    #[test]
    fn elf_magic_is_direct_regardless_of_extension() {
        let mut data = ELF_MAGIC.to_vec();
        data.extend_from_slice(b"\x02\x01\x01\x00");
        let plan = classify(Path::new("sample.bin"), &data);
        assert_eq!(plan, ExecPlan::Direct(PathBuf::from("sample.bin")));
    }

    #[test]
    fn shebang_without_extension_is_honored() {
        let plan = classify(Path::new("sample"), b"#!/bin/bash\necho hi\n");
        assert_eq!(
            plan,
            ExecPlan::Interpreter { cmd: "/bin/bash".into(), args: vec!["sample".into()] }
        );
    }

    #[test]
    fn unrecognized_file_falls_back_to_sh() {
        let plan = classify(Path::new("sample.dat"), b"not a script");
        assert_eq!(
            plan,
            ExecPlan::Interpreter { cmd: "sh".into(), args: vec!["sample.dat".into()] }
        );
    }
}
