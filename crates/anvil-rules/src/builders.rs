use std::path::Path;
use std::sync::Arc;

use anvil_engine::{BuildError, Ctx, EngineBuilder, Key, KeyFn, RunFn, Target};
use anvil_process::run_command;

use crate::depfile::{extra_depends, load_deps, reject_generated_headers, SENTINEL};
use crate::options::Options;

async fn submit_command(ctx: &Ctx, argv: Vec<String>, message: String) -> Result<(), BuildError> {
    ctx.job_pool()
        .submit(async move { run_command(&argv, &message).await })
        .await
        .unwrap_or_else(|join_err| Err(BuildError::new(format!("job panicked: {join_err}"))))
}

async fn ensure_parent_dir(path: &str) -> Result<(), BuildError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::new(format!("creating directory {}: {e}", parent.display())))?;
        }
    }
    Ok(())
}

fn hashes_to_key(prefix: Vec<Key>, hashes: Vec<String>) -> Key {
    let mut parts = prefix;
    parts.extend(hashes.into_iter().map(Key::from));
    Key::Array(parts)
}

/// Registers a task that runs a sequence of commands once every target in `prereqs` is up
/// to date, labeling each step `"{label} ({i}/{n})"`. A task owning any abstract target is
/// never cached (there is nothing on disk whose content a key could usefully describe).
pub fn rule(
    builder: &mut EngineBuilder,
    label: impl Into<String>,
    targets: Vec<Target>,
    prereqs: Vec<Target>,
    recipe: Vec<Vec<String>>,
) {
    let label = label.into();
    let cacheable = !targets.iter().any(Target::is_abstract);

    let run: RunFn = {
        let targets = targets.clone();
        let prereqs = prereqs.clone();
        let recipe = recipe.clone();
        let label = label.clone();
        Arc::new(move |ctx: Ctx| {
            let targets = targets.clone();
            let prereqs = prereqs.clone();
            let recipe = recipe.clone();
            let label = label.clone();
            Box::pin(async move {
                ctx.update(&prereqs).await?;
                let n = recipe.len();
                for (i, argv) in recipe.into_iter().enumerate() {
                    let message = format!("{label} ({}/{n})", i + 1);
                    submit_command(&ctx, argv, message).await?;
                }
                for t in &targets {
                    if let Some(path) = t.as_file_path() {
                        ctx.invalidate_digest(path);
                    }
                }
                Ok(())
            })
        })
    };

    let key: Option<KeyFn> = if cacheable {
        let targets = targets.clone();
        let prereqs = prereqs.clone();
        let recipe = recipe.clone();
        let key_fn: KeyFn = Arc::new(move |ctx: Ctx| {
            let targets = targets.clone();
            let prereqs = prereqs.clone();
            let recipe = recipe.clone();
            Box::pin(async move {
                ctx.update(&prereqs).await?;
                let mut all = targets;
                all.extend(prereqs);
                let hashes = ctx.hash_file_targets(&all).await;
                let prefix = recipe.iter().map(|argv| Key::from(argv.clone())).collect();
                Ok(hashes_to_key(prefix, hashes))
            })
        });
        Some(key_fn)
    } else {
        None
    };

    builder.add_task(label, targets, run, key);
}

/// Strips the trailing extension from the filename component of `path`, leaving any
/// leading directory untouched (`src/Player.cpp` -> `src/Player`, not `Player`).
fn strip_extension(path: &str) -> String {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) => path[..name_start + dot].to_string(),
        None => path.to_string(),
    }
}

/// Registers a task that compiles one C++ source file to an object file, discovering its
/// header dependencies from a dedicated `-E -M -MG` dependency-scan invocation rather than
/// requiring them to be declared up front.
///
/// `obj_base`, if given, overrides the default `objPrefix + strip_extension(source)` base
/// that the object and depfile paths are derived from.
///
/// Returns the object file's target, for use as a `LINK` prerequisite.
pub fn cpp(builder: &mut EngineBuilder, source: &str, obj_base: Option<&str>, options: &Options) -> Target {
    let base = obj_base
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}{}", options.obj_prefix, strip_extension(source)));
    let obj_path = format!("{base}{}", options.obj_suffix);
    let deps_path = format!("{base}.d");
    let obj_target = Target::file(obj_path.clone());

    let explicit: Vec<Target> = std::iter::once(Target::file(source))
        .chain(options.depends.iter().map(Target::file))
        .collect();
    let explicit_strs: Vec<String> = std::iter::once(source.to_string())
        .chain(options.depends.iter().cloned())
        .collect();

    let mut obj_argv = vec![options.compiler.clone(), "-c".to_string(), "-o".to_string(), obj_path.clone()];
    obj_argv.extend(options.cpp_flags.clone());
    obj_argv.push(source.to_string());

    let mut deps_argv = vec![
        options.compiler.clone(),
        "-E".to_string(),
        "-M".to_string(),
        "-MG".to_string(),
        "-MT".to_string(),
        format!("{SENTINEL} "),
        "-MF".to_string(),
        deps_path.clone(),
    ];
    deps_argv.extend(options.cpp_flags.clone());
    deps_argv.push(source.to_string());

    let run: RunFn = {
        let explicit = explicit.clone();
        let obj_path = obj_path.clone();
        let deps_path = deps_path.clone();
        let obj_argv = obj_argv.clone();
        let deps_argv = deps_argv.clone();
        let explicit_strs = explicit_strs.clone();
        let source = source.to_string();
        Arc::new(move |ctx: Ctx| {
            let explicit = explicit.clone();
            let obj_path = obj_path.clone();
            let deps_path = deps_path.clone();
            let obj_argv = obj_argv.clone();
            let deps_argv = deps_argv.clone();
            let explicit_strs = explicit_strs.clone();
            let source = source.clone();
            Box::pin(async move {
                ctx.update(&explicit).await?;

                ctx.invalidate_digest(&obj_path);
                ensure_parent_dir(&obj_path).await?;
                submit_command(&ctx, obj_argv, format!("compiling {source}")).await?;

                ctx.invalidate_digest(&deps_path);
                ensure_parent_dir(&deps_path).await?;
                submit_command(&ctx, deps_argv, format!("scanning dependencies of {source}")).await?;

                let contents = tokio::fs::read_to_string(&deps_path).await.ok();
                let deps = load_deps(contents.as_deref())?;
                let extra = extra_depends(deps, &explicit_strs);
                reject_generated_headers(&extra, |d| ctx.is_known(&Target::file(d)))?;
                Ok(())
            })
        })
    };

    let key: KeyFn = {
        let explicit = explicit.clone();
        let obj_path = obj_path.clone();
        let deps_path = deps_path.clone();
        let obj_argv = obj_argv.clone();
        let deps_argv = deps_argv.clone();
        let explicit_strs = explicit_strs.clone();
        Arc::new(move |ctx: Ctx| {
            let explicit = explicit.clone();
            let obj_path = obj_path.clone();
            let deps_path = deps_path.clone();
            let obj_argv = obj_argv.clone();
            let deps_argv = deps_argv.clone();
            let explicit_strs = explicit_strs.clone();
            Box::pin(async move {
                ctx.update(&explicit).await?;
                let contents = tokio::fs::read_to_string(&deps_path).await.ok();
                let deps = load_deps(contents.as_deref())?;
                let extra = extra_depends(deps, &explicit_strs);

                let mut paths = vec![obj_path.clone(), deps_path.clone()];
                paths.extend(explicit_strs);
                paths.extend(extra);
                let mut hashes = Vec::with_capacity(paths.len());
                for p in paths {
                    hashes.push(ctx.digest().hash(&p).await);
                }
                let prefix = vec![Key::from(obj_argv.clone()), Key::from(deps_argv.clone())];
                Ok(hashes_to_key(prefix, hashes))
            })
        })
    };

    builder.add_task(format!("compile {source}"), vec![obj_target.clone()], run, Some(key));
    obj_target
}

/// Registers a task that links object files into an executable.
pub fn link(builder: &mut EngineBuilder, exe_name: &str, objs: Vec<Target>, options: &Options) -> Target {
    let exe_path = format!("{exe_name}{}", options.exe_suffix);
    let exe_target = Target::file(exe_path.clone());

    let depends: Vec<Target> = objs.iter().cloned().chain(options.depends.iter().map(Target::file)).collect();

    let mut link_argv = vec![options.linker.clone(), "-o".to_string(), exe_path.clone()];
    link_argv.extend(objs.iter().filter_map(|t| t.as_file_path().map(str::to_string)));
    link_argv.extend(options.link_libs.clone());

    let run: RunFn = {
        let depends = depends.clone();
        let exe_path = exe_path.clone();
        let link_argv = link_argv.clone();
        Arc::new(move |ctx: Ctx| {
            let depends = depends.clone();
            let exe_path = exe_path.clone();
            let link_argv = link_argv.clone();
            Box::pin(async move {
                ctx.update(&depends).await?;
                ctx.invalidate_digest(&exe_path);
                ensure_parent_dir(&exe_path).await?;
                submit_command(&ctx, link_argv, format!("linking {exe_path}")).await
            })
        })
    };

    let key: KeyFn = {
        let depends = depends.clone();
        let exe_target = exe_target.clone();
        let link_argv = link_argv.clone();
        Arc::new(move |ctx: Ctx| {
            let depends = depends.clone();
            let exe_target = exe_target.clone();
            let link_argv = link_argv.clone();
            Box::pin(async move {
                ctx.update(&depends).await?;
                let mut all = vec![exe_target];
                all.extend(depends);
                let hashes = ctx.hash_file_targets(&all).await;
                Ok(hashes_to_key(vec![Key::from(link_argv)], hashes))
            })
        })
    };

    builder.add_task(format!("link {exe_path}"), vec![exe_target.clone()], run, Some(key));
    exe_target
}
