//! C language handler

use super::{c_cpp_seccomp, c_family_spj, default_env, CompileTemplate, LanguageHandler, RunTemplate};
use crate::constants::languages;

const GCC: &str = "/usr/bin/gcc -DONLINE_JUDGE -O2 -w -fmax-errors=3 -std=c99 {src_path} -lm -o {exe_path}";

/// Get handler for C
pub fn handler() -> LanguageHandler {
    LanguageHandler {
        name: languages::C,
        compile: Some(CompileTemplate {
            src_name: "main.c",
            exe_name: "main",
            max_cpu_time: 3000,
            max_real_time: 5000,
            max_memory: 128 * 1024 * 1024,
            command: GCC,
        }),
        run: RunTemplate {
            command: "{exe_path}",
            seccomp_rule: c_cpp_seccomp(),
            env: default_env(),
            memory_limit_check_only: false,
        },
        spj: Some(c_family_spj("spj-{spj_version}.c", GCC)),
    }
}
