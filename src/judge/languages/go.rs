//! Go language handler

use super::{default_env, CompileTemplate, LanguageHandler, RunTemplate, SeccompRule};
use crate::constants::languages;

/// Get handler for Go
pub fn handler() -> LanguageHandler {
    let mut env = vec!["GODEBUG=madvdontneed=1", "GOCACHE=off"];
    env.extend(default_env());

    LanguageHandler {
        name: languages::GO,
        compile: Some(CompileTemplate {
            src_name: "main.go",
            exe_name: "main",
            max_cpu_time: 3000,
            max_real_time: 5000,
            max_memory: 1024 * 1024 * 1024,
            command: "/usr/bin/go build -o {exe_path} {src_path}",
        }),
        run: RunTemplate {
            command: "{exe_path}",
            seccomp_rule: SeccompRule::Unrestricted,
            env,
            memory_limit_check_only: true,
        },
        spj: None,
    }
}
