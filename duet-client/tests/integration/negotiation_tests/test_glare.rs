use duet_client::negotiation::{NegotiationRole, OfferOutcome};
use duet_client::transport::SignalingState;

use crate::integration::init_tracing;
use crate::integration::negotiation_tests::{TestNegotiator, both};

#[tokio::test]
async fn test_simultaneous_offers_resolve_to_one_negotiation() {
    init_tracing();

    let mut alice = TestNegotiator::new("alice");
    let mut bob = TestNegotiator::new("bob");
    let users = both(&alice, &bob);

    // Bob joined second, so he is the impolite initiator.
    alice.negotiator.on_user_joined(&users, &bob.id);
    bob.negotiator.on_user_joined(&users, &bob.id);
    assert_eq!(alice.negotiator.role(), Some(NegotiationRole::Polite));
    assert_eq!(bob.negotiator.role(), Some(NegotiationRole::Impolite));

    // Both sides offer before seeing the other's offer.
    alice.negotiator.make_offer().await.expect("alice offer");
    bob.negotiator.make_offer().await.expect("bob offer");
    let alice_offer = alice.last_offer().await;
    let bob_offer = bob.last_offer().await;

    let outcome = bob
        .negotiator
        .on_remote_offer(Some(alice.id.clone()), alice_offer)
        .await
        .expect("impolite side handles colliding offer");
    assert_eq!(outcome, OfferOutcome::Ignored);
    assert_eq!(bob.signaling.count("answer").await, 0);

    let outcome = alice
        .negotiator
        .on_remote_offer(Some(bob.id.clone()), bob_offer)
        .await
        .expect("polite side handles colliding offer");
    assert_eq!(outcome, OfferOutcome::Answered);

    let alice_link = alice.transports.last().expect("alice link");
    let log = alice_link.log();
    let rollback = log.iter().position(|op| op == "rollback").expect("rolled back");
    let remote = log
        .iter()
        .position(|op| op == "set-remote:offer")
        .expect("applied remote offer");
    assert!(rollback < remote, "rollback must precede the remote offer: {log:?}");

    bob.negotiator
        .on_remote_answer(alice.last_answer().await)
        .await
        .expect("bob applies answer");

    let bob_link = bob.transports.last().expect("bob link");
    assert_eq!(alice_link.current_state(), SignalingState::Stable);
    assert_eq!(bob_link.current_state(), SignalingState::Stable);
    assert_eq!(alice.transports.created(), 1);
    assert_eq!(bob.transports.created(), 1);
}

#[tokio::test]
async fn test_polite_side_answers_without_collision() {
    init_tracing();

    let mut alice = TestNegotiator::new("alice");
    let mut bob = TestNegotiator::new("bob");
    let users = both(&alice, &bob);
    alice.negotiator.on_user_joined(&users, &bob.id);
    bob.negotiator.on_user_joined(&users, &bob.id);

    bob.negotiator.make_offer().await.expect("bob offer");
    let outcome = alice
        .negotiator
        .on_remote_offer(Some(bob.id.clone()), bob.last_offer().await)
        .await
        .expect("alice answers");
    assert_eq!(outcome, OfferOutcome::Answered);

    let log = alice.transports.last().expect("alice link").log();
    assert!(!log.iter().any(|op| op == "rollback"));
    assert_eq!(alice.signaling.count("answer").await, 1);
}
