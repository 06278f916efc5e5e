/*! Integration tests for Bagtree.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - paths: Path grammar, positions and autocreation through the public API
 * - events: Container and node subscriptions, bubbling, fired signals
 * - merge: merge/update/filtered across trees
 * - resolver: Resolver caching, read-only loads and sync/async dispatch
 * - traversal: walk, traverse, digest and display
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("bagtree=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod events;
mod helpers;
mod merge;
mod paths;
mod resolver;
mod traversal;
