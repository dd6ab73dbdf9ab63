use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Parses `worker_threads = N` out of an attribute argument list.
///
/// Returns `0` when absent, which selects the engine's default pool
/// size.
fn parse_worker_threads(attr: TokenStream) -> usize {
    let attr_str = attr.to_string();
    let mut worker_threads = 0usize;

    if !attr_str.is_empty() {
        for part in attr_str.split(',') {
            let part = part.trim();
            if let Some(value) = part.strip_prefix("worker_threads") {
                let value = value.trim_start_matches('=').trim();
                worker_threads = value.parse::<usize>().unwrap_or(0);
            }
        }
    }

    worker_threads
}

/// Rewrites `fn name(ctx: &mut fibra::Context) { .. }` into a plain
/// function that runs its body as the first routine of a fresh engine.
fn wrap_routine_fn(item: TokenStream, worker_threads: usize) -> Option<TokenStream> {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let block_pos = tokens.iter().rposition(
        |t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace),
    )?;

    let params_pos = tokens[..block_pos].iter().rposition(
        |t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Parenthesis),
    )?;

    // The binding name of the context parameter, skipping a `mut`
    // modifier if present.
    let context_name = match &tokens[params_pos] {
        TokenTree::Group(group) => group.stream().into_iter().find_map(|t| match t {
            TokenTree::Ident(ident) if ident.to_string() != "mut" => Some(ident.to_string()),
            _ => None,
        }),
        _ => None,
    }?;

    let block = match &tokens[block_pos] {
        TokenTree::Group(group) => group.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = format!(
        "::fibra::run({}, move |{}: &mut ::fibra::Context| {{ {} }})",
        worker_threads, context_name, block
    );

    tokens[params_pos] = TokenTree::Group(Group::new(Delimiter::Parenthesis, TokenStream::new()));
    tokens[block_pos] = TokenTree::Group(Group::new(
        Delimiter::Brace,
        new_block.parse().ok()?,
    ));

    Some(tokens.into_iter().collect())
}

/// Runs a `main(ctx: &mut fibra::Context)` function as the first
/// routine of an engine.
///
/// Accepts `worker_threads = N` to size the pool:
///
/// ```rust,ignore
/// #[fibra::main(worker_threads = 2)]
/// fn main(ctx: &mut fibra::Context) {
///     ctx.yield_now();
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let worker_threads = parse_worker_threads(attr);

    match wrap_routine_fn(item, worker_threads) {
        Some(tokens) => tokens,
        None => "compile_error!(\"#[fibra::main] expects `fn main(ctx: &mut fibra::Context)`\");"
            .parse()
            .unwrap(),
    }
}

/// Runs a test body as the first routine of an engine.
///
/// The test function takes the routine context as its only parameter;
/// `worker_threads = N` sizes the pool:
///
/// ```rust,ignore
/// #[fibra::test]
/// fn wakes_up(ctx: &mut fibra::Context) {
///     fibra::time::sleep(ctx, Duration::from_millis(1));
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let worker_threads = parse_worker_threads(attr);

    let Some(tokens) = wrap_routine_fn(item, worker_threads) else {
        return "compile_error!(\"#[fibra::test] expects `fn name(ctx: &mut fibra::Context)`\");"
            .parse()
            .unwrap();
    };

    let test_attr: TokenStream = "#[test]".parse().unwrap();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
