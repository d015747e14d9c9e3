//! Python language handlers

use super::{default_env, CompileTemplate, LanguageHandler, RunTemplate, SeccompRule};
use crate::constants::{languages, seccomp_rules};

/// Get handler for Python 2
pub fn python2() -> LanguageHandler {
    LanguageHandler {
        name: languages::PYTHON2,
        compile: Some(CompileTemplate {
            src_name: "solution.py",
            exe_name: "solution.pyc",
            max_cpu_time: 3000,
            max_real_time: 10000,
            max_memory: 128 * 1024 * 1024,
            command: "/usr/bin/python -m py_compile {src_path}",
        }),
        run: RunTemplate {
            command: "/usr/bin/python {exe_path}",
            seccomp_rule: SeccompRule::Fixed(seccomp_rules::GENERAL),
            env: default_env(),
            memory_limit_check_only: false,
        },
        spj: None,
    }
}

/// Get handler for Python 3
pub fn python3() -> LanguageHandler {
    let mut env = default_env();
    env.push("PYTHONIOENCODING=utf-8");

    LanguageHandler {
        name: languages::PYTHON3,
        compile: Some(CompileTemplate {
            src_name: "solution.py",
            exe_name: "__pycache__/solution.cpython-36.pyc",
            max_cpu_time: 3000,
            max_real_time: 10000,
            max_memory: 128 * 1024 * 1024,
            command: "/usr/bin/python3 -m py_compile {src_path}",
        }),
        run: RunTemplate {
            command: "/usr/bin/python3 {exe_path}",
            seccomp_rule: SeccompRule::Fixed(seccomp_rules::GENERAL),
            env,
            memory_limit_check_only: false,
        },
        spj: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IoMode;

    #[test]
    fn test_python3_forces_utf8_io() {
        let config = python3().language_config(&IoMode::default());
        assert!(config.run.env.iter().any(|e| e == "PYTHONIOENCODING=utf-8"));
        assert!(!python2()
            .language_config(&IoMode::default())
            .run
            .env
            .iter()
            .any(|e| e.starts_with("PYTHONIOENCODING")));
    }
}
