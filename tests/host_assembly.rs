use epicoal_rs::host::{TipEvent, build_hosts};
use epicoal_rs::io::linelist::CaseRecord;

fn case(
    id: &str,
    infector: Option<&str>,
    infection_time: f64,
    sampling_time: Option<f64>,
) -> CaseRecord {
    CaseRecord {
        id: id.to_string(),
        infector: infector.map(str::to_string),
        infection_time,
        sampling_time,
        kind: None,
    }
}

#[test]
fn assembles_within_host_problems() {
    let records = vec![
        case("index", None, 0.0, Some(3.0)),
        case("a", Some("index"), 1.0, Some(2.5)),
        case("b", Some("a"), 1.5, Some(4.0)),
    ];
    let hosts = build_hosts(&records).expect("hosts");
    assert_eq!(hosts.len(), 3);

    let index = &hosts[0];
    assert_eq!(index.name, "index");
    assert_eq!(index.infector, None);
    assert_eq!(index.infection_time, 0.0);
    // One transmission tip at 1.0, the host's own sample at 3.0.
    assert_eq!(index.tip_times, vec![1.0, 3.0]);
    assert_eq!(index.tip_counts, vec![1, 1]);
    assert_eq!(index.attachments[0], vec![TipEvent::Transmission(1)]);
    assert_eq!(index.attachments[1], vec![TipEvent::Sampling]);

    let a = &hosts[1];
    assert_eq!(a.infector, Some(0));
    assert_eq!(a.tip_times, vec![1.5, 2.5]);
    assert_eq!(a.attachments[0], vec![TipEvent::Transmission(2)]);

    let b = &hosts[2];
    assert_eq!(b.infector, Some(1));
    assert_eq!(b.tip_times, vec![4.0]);
    assert_eq!(b.n_tips(), 1);
}

#[test]
fn groups_simultaneous_tips_into_one_epoch() {
    let records = vec![
        case("index", None, 0.0, Some(2.0)),
        case("a", Some("index"), 2.0, Some(3.0)),
        case("b", Some("index"), 2.0, Some(3.5)),
    ];
    let hosts = build_hosts(&records).expect("hosts");
    let index = &hosts[0];
    assert_eq!(index.tip_times, vec![2.0]);
    assert_eq!(index.tip_counts, vec![3]);
    assert_eq!(index.attachments[0].len(), 3);
    assert_eq!(index.cum_tips(0), 3);
}

#[test]
fn prunes_unsampled_subtrees() {
    let records = vec![
        case("index", None, 0.0, Some(5.0)),
        // Unsampled intermediate kept because its infectee is sampled.
        case("mid", Some("index"), 1.0, None),
        case("leafy", Some("mid"), 2.0, Some(3.0)),
        // Unsampled dead end, dropped together with its tip.
        case("ghost", Some("index"), 1.5, None),
    ];
    let hosts = build_hosts(&records).expect("hosts");
    assert_eq!(hosts.len(), 3);
    assert!(hosts.iter().all(|h| h.name != "ghost"));

    let index = &hosts[0];
    assert_eq!(index.tip_times, vec![1.0, 5.0]);

    let mid = &hosts[1];
    assert_eq!(mid.name, "mid");
    assert_eq!(mid.n_tips(), 1);
    assert_eq!(mid.attachments[0], vec![TipEvent::Transmission(2)]);
}

#[test]
fn rejects_inconsistent_linelists() {
    let dup = vec![case("x", None, 0.0, Some(1.0)), case("x", None, 0.0, Some(1.0))];
    assert!(build_hosts(&dup).is_err());

    let unknown = vec![case("x", Some("nobody"), 0.0, Some(1.0))];
    assert!(build_hosts(&unknown).is_err());

    let own = vec![case("x", Some("x"), 0.0, Some(1.0))];
    assert!(build_hosts(&own).is_err());

    let backwards = vec![
        case("x", None, 1.0, Some(2.0)),
        case("y", Some("x"), 0.5, Some(2.0)),
    ];
    assert!(build_hosts(&backwards).is_err());

    let unsampled = vec![case("x", None, 0.0, None), case("y", Some("x"), 1.0, None)];
    assert!(build_hosts(&unsampled).is_err());
}
