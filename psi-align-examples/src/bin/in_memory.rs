//! In-memory example of an alignment run.
//!
//! This example runs both parties within a single process over an in-memory
//! channel, first through the session API one message at a time and then
//! through the runner on larger generated sets.
//!
//! Run with:
//! ```bash
//! cargo run --bin in_memory
//! RUST_LOG=debug cargo run --bin in_memory
//! ```

use psi_align::{
    plain_intersection, run_local, AliceState, BobState, Message, ProtocolContext, PsiConfig,
    Ristretto255,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== PSI Alignment In-Memory Example ===\n");

    // Alice holds the larger set
    let alice_items: Vec<Vec<u8>> = vec![
        b"alice_sample_1".to_vec(),
        b"shared_sample_1".to_vec(),
        b"alice_sample_2".to_vec(),
        b"shared_sample_2".to_vec(),
        b"alice_sample_3".to_vec(),
    ];

    let bob_items: Vec<Vec<u8>> = vec![
        b"bob_sample_1".to_vec(),
        b"shared_sample_2".to_vec(),
        b"shared_sample_1".to_vec(),
    ];

    println!("Alice's items ({}):", alice_items.len());
    for (i, item) in alice_items.iter().enumerate() {
        println!("  {}: {}", i + 1, String::from_utf8_lossy(item));
    }

    println!("\nBob's items ({}):", bob_items.len());
    for (i, item) in bob_items.iter().enumerate() {
        println!("  {}: {}", i + 1, String::from_utf8_lossy(item));
    }

    // === Phase 1: Negotiate roles ===
    println!("\n--- Phase 1: Negotiate Roles ---");

    let mut alice_ctx = ProtocolContext::new(alice_items.len());
    alice_ctx.negotiate_role(bob_items.len())?;
    let mut bob_ctx = ProtocolContext::new(bob_items.len());
    bob_ctx.negotiate_role_with(alice_ctx.role.as_str(), alice_items.len())?;
    println!("First party is {}, second party is {}", alice_ctx.role, bob_ctx.role);

    // === Phase 2: Blind ===
    println!("\n--- Phase 2: Blind ---");

    let alice = AliceState::<Ristretto255>::new(alice_ctx, &alice_items)?;
    let bob = BobState::<Ristretto255>::new(bob_ctx, &bob_items)?;
    let points = bob.points();
    println!("Bob sends {} blinded points", points.points.len());

    // === Phase 3: Filter and probe ===
    println!("\n--- Phase 3: Filter and Probe ---");

    let (alice, reply) = alice.respond(points)?;
    println!(
        "Alice returns {} doubly-blinded points and a {}-byte filter",
        reply.double_points.len(),
        reply.filter.len()
    );
    let (bob, candidates) = bob.align(reply)?;
    println!("Bob found {} candidates", candidates.candidates.len());

    // === Phase 4: Correct ===
    println!("\n--- Phase 4: Correct ---");

    let (alice_result, check) = alice.check(candidates)?;
    let check = check.ok_or("correction round was skipped")?;
    println!("Alice reports {} false positives", check.wrong_count);
    let wire = serde_json::to_string(&Message::from(check.clone()))?;
    println!("AliceCheck on the wire: {} bytes", wire.len());
    let bob_result = bob.finish(check)?;

    // === Results ===
    println!("\n=== Results ===");
    println!("Alice found {} items in intersection", alice_result.len());
    println!("Bob found {} items in intersection", bob_result.len());
    assert_eq!(
        alice_result.intersection, bob_result.intersection,
        "Intersections do not match!"
    );

    println!("\nIntersection items:");
    for (i, item) in bob_result.intersection.iter().enumerate() {
        println!(
            "  {}: {} ({})",
            i + 1,
            String::from_utf8_lossy(item),
            hex::encode(item)
        );
    }

    println!("\n✓ Protocol completed successfully!");
    println!("✓ Both parties computed the same intersection");

    // === Additional example: Larger generated sets ===
    println!("\n\n=== Larger Sets Example ===\n");

    let alice_large: Vec<Vec<u8>> = (0..10_000u32)
        .map(|i| format!("id-{i}").into_bytes())
        .collect();
    let bob_large: Vec<Vec<u8>> = (9_000..11_000u32)
        .map(|i| format!("id-{i}").into_bytes())
        .collect();
    println!("Alice: {} items, Bob: {} items", alice_large.len(), bob_large.len());

    let (alice_res, bob_res) = run_local(&alice_large, &bob_large, &PsiConfig::default())?;
    let expected = plain_intersection(&bob_large, &alice_large);

    println!(
        "\nIntersection size: {} (expected: {})",
        bob_res.len(),
        expected.len()
    );
    println!(
        "✓ Verification: {}",
        if alice_res.intersection == expected && bob_res.intersection == expected {
            "PASSED"
        } else {
            "FAILED"
        }
    );

    Ok(())
}
