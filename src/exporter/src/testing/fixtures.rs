//! Trimmed cluster replies captured from Nautilus and Pacific test clusters.

use serde_json::{Value, json};

pub const VERSION_PACIFIC: &str =
    "ceph version 16.2.11 (3cf40e2dca667f68c6ce3ff5cd94f01e711af894) pacific (stable)";

pub const VERSION_NAUTILUS: &str =
    "ceph version 14.2.22 (ca74598065096e6fcbd8433c8779a2be0c889351) nautilus (stable)";

/// `ceph version` reply
pub fn version(banner: &str) -> Value {
    json!({ "version": banner })
}

/// Plain `status` output of a pre-Nautilus cluster
pub const STATUS_PLAIN_LUMINOUS: &str = "  cluster:
    id:     5b8d4b8e-8a7e-4f0e-9d7b-6b4a7c1e2f3a
    health: HEALTH_WARN
            1 osds down

  services:
    mon: 3 daemons, quorum a,b,c
    mgr: a(active), standbys: b
    osd: 6 osds: 5 up, 6 in

  data:
    pools:   2 pools, 64 pgs
    objects: 1.50k objects, 5.0 GiB
    usage:   15 GiB used, 1.8 TiB / 1.8 TiB avail
    pgs:     64 active+clean

  io:
    client:   1234 kB/s rd, 56 KiB/s wr, 40 op/s rd, 56 op/s wr
    recovery: 12 MB/s, 4 objects/s
";

fn health_checks() -> Value {
    let check = |severity: &str, message: &str| {
        json!({"severity": severity, "summary": {"message": message}, "muted": false})
    };

    json!({
        "OSD_DOWN": check("HEALTH_WARN", "1 osds down"),
        "PG_AVAILABILITY": check(
            "HEALTH_WARN",
            "Reduced data availability: 5 pgs inactive, 2 pgs stuck stale"
        ),
        "PG_DEGRADED": check(
            "HEALTH_WARN",
            "Degraded data redundancy: 1234/37020 objects degraded (3.333%), 12 pgs degraded"
        ),
        "OBJECT_MISPLACED": check("HEALTH_WARN", "100/1000 objects misplaced (10.000%)"),
        "SLOW_OPS": check(
            "HEALTH_WARN",
            "42 slow ops, oldest one blocked for 66 sec, daemons [osd.1] have slow ops."
        ),
        "MON_DOWN": check("HEALTH_WARN", "1/3 mons down, quorum a,b"),
        "RECENT_CRASH": check("HEALTH_WARN", "2 daemons have recently crashed"),
        "OSDMAP_FLAGS": check("HEALTH_WARN", "noout,nodeep-scrub,nosuchflag flag(s) set"),
    })
}

fn pgmap() -> Value {
    json!({
        "pgs_by_state": [
            {"state_name": "active+clean", "count": 50},
            {"state_name": "active+clean+scrubbing", "count": 2},
            {"state_name": "active+clean+scrubbing+deep", "count": 5},
            {"state_name": "peering", "count": 7}
        ],
        "num_pgs": 64,
        "num_pools": 2,
        "num_objects": 1500,
        "data_bytes": 5_000_000_000u64,
        "read_bytes_sec": 1024,
        "write_bytes_sec": 2048,
        "read_op_per_sec": 10,
        "write_op_per_sec": 20
    })
}

/// `status` of a Pacific cluster: flat osdmap, summarised mgrmap
pub fn status_pacific() -> Value {
    json!({
        "fsid": "5b8d4b8e-8a7e-4f0e-9d7b-6b4a7c1e2f3a",
        "health": {"status": "HEALTH_WARN", "checks": health_checks(), "mutes": []},
        "quorum_names": ["a", "b"],
        "osdmap": {
            "epoch": 412,
            "num_osds": 6,
            "num_up_osds": 5,
            "osd_up_since": 1700000000,
            "num_in_osds": 6,
            "osd_in_since": 1700000000,
            "num_remapped_pgs": 0
        },
        "pgmap": pgmap(),
        "mgrmap": {"available": true, "num_standbys": 1, "modules": ["prometheus"]}
    })
}

/// `status` of a Nautilus cluster: nested osdmap, full mgrmap
pub fn status_nautilus() -> Value {
    json!({
        "fsid": "5b8d4b8e-8a7e-4f0e-9d7b-6b4a7c1e2f3a",
        "health": {"status": "HEALTH_WARN", "checks": health_checks()},
        "quorum_names": ["a", "b"],
        "osdmap": {
            "osdmap": {
                "epoch": 412,
                "num_osds": 6,
                "num_up_osds": 5,
                "num_in_osds": 6,
                "full": false,
                "nearfull": false,
                "num_remapped_pgs": 0
            }
        },
        "pgmap": pgmap(),
        "mgrmap": {
            "epoch": 30,
            "active_gid": 4107,
            "active_name": "a",
            "available": true,
            "standbys": [{"gid": 4210, "name": "b"}]
        }
    })
}

fn pg_stats() -> Value {
    json!([
        {"pgid": "1.0", "state": "active+clean+scrubbing+deep", "up": [0, 1], "acting": [0, 1], "up_primary": 0, "acting_primary": 0},
        {"pgid": "1.1", "state": "active+clean+scrubbing", "up": [1, 2], "acting": [1, 2], "up_primary": 1, "acting_primary": 1},
        {"pgid": "1.2", "state": "peering", "up": [2, 0], "acting": [2, 0], "up_primary": 2, "acting_primary": 2}
    ])
}

/// `pg dump pgs_brief` from Octopus on
pub fn pg_dump_wrapped() -> Value {
    json!({"pg_ready": true, "pg_stats": pg_stats()})
}

/// `pg dump pgs_brief` before Octopus
pub fn pg_dump_bare() -> Value {
    pg_stats()
}

pub fn df() -> Value {
    json!({
        "stats": {
            "total_bytes": 3_000_000_000_000u64,
            "total_avail_bytes": 1_800_000_000_000u64,
            "total_used_bytes": 1_000_000_000_000u64,
            "total_used_raw_bytes": 1_200_000_000_000u64,
            "total_used_raw_ratio": 0.4
        },
        "pools": [
            {
                "name": "rbd",
                "id": 1,
                "stats": {
                    "stored": 4_000_000_000u64,
                    "objects": 1000,
                    "kb_used": 11_718_750,
                    "bytes_used": 12_000_000_000u64,
                    "raw_bytes_used": 12_000_000_000u64,
                    "percent_used": 0.024,
                    "max_avail": 500_000_000_000u64,
                    "quota_objects": 0,
                    "quota_bytes": 0,
                    "dirty": 0,
                    "rd": 5000,
                    "rd_bytes": 2_000_000_000u64,
                    "wr": 3000,
                    "wr_bytes": 8_000_000_000u64
                }
            },
            {
                "name": "cephfs_data",
                "id": 2,
                "stats": {
                    "stored": 1_000_000_000u64,
                    "objects": 500,
                    "bytes_used": 3_000_000_000u64,
                    "raw_bytes_used": 3_000_000_000u64,
                    "percent_used": 0.006,
                    "max_avail": 500_000_000_000u64,
                    "quota_objects": 10000,
                    "quota_bytes": 0,
                    "dirty": 0,
                    "rd": 100,
                    "rd_bytes": 4096,
                    "wr": 200,
                    "wr_bytes": 8192
                }
            }
        ]
    })
}

pub fn osd_pool_ls_detail() -> Value {
    json!([
        {
            "pool": 1,
            "pool_name": "rbd",
            "type": 1,
            "size": 3,
            "min_size": 2,
            "crush_rule": 0,
            "pg_num": 32,
            "pg_placement_num": 32,
            "erasure_code_profile": "",
            "application_metadata": {"rbd": {}}
        },
        {
            "pool": 2,
            "pool_name": "ec42",
            "type": 3,
            "size": 6,
            "min_size": 5,
            "crush_rule": 1,
            "pg_num": 64,
            "pg_placement_num": 64,
            "erasure_code_profile": "k4m2",
            "application_metadata": {}
        }
    ])
}

/// Three OSDs under two hosts in one rack
pub fn osd_tree() -> Value {
    json!({
        "nodes": [
            {"id": -1, "name": "default", "type": "root", "type_id": 11, "children": [-3]},
            {"id": -3, "name": "rack1", "type": "rack", "type_id": 3, "children": [-4, -2]},
            {"id": -2, "name": "node-a", "type": "host", "type_id": 1, "children": [1, 0]},
            {"id": -4, "name": "node-b", "type": "host", "type_id": 1, "children": [2]},
            {"id": 0, "device_class": "hdd", "name": "osd.0", "type": "osd", "type_id": 0, "crush_weight": 0.5, "depth": 3, "status": "up", "reweight": 1.0},
            {"id": 1, "device_class": "hdd", "name": "osd.1", "type": "osd", "type_id": 0, "crush_weight": 0.5, "depth": 3, "status": "up", "reweight": 1.0},
            {"id": 2, "device_class": "ssd", "name": "osd.2", "type": "osd", "type_id": 0, "crush_weight": 0.25, "depth": 3, "status": "down", "reweight": 1.0}
        ],
        "stray": []
    })
}

pub fn osd_df() -> Value {
    let node = |id: i64, class: &str, weight: f64, used: u64| {
        json!({
            "id": id,
            "device_class": class,
            "name": format!("osd.{id}"),
            "type": "osd",
            "crush_weight": weight,
            "depth": 2,
            "reweight": 1.0,
            "kb": 1024,
            "kb_used": used,
            "kb_avail": 1024 - used,
            "utilization": used as f64 / 10.24,
            "var": 1.0,
            "pgs": 40,
            "status": "up"
        })
    };

    json!({
        "nodes": [
            node(0, "hdd", 0.5, 256),
            node(1, "hdd", 0.5, 256),
            node(2, "ssd", 0.25, 512)
        ],
        "stray": [],
        "summary": {
            "total_kb": 3072,
            "total_kb_used": 1024,
            "total_kb_avail": 2048,
            "average_utilization": 33.33,
            "min_var": 0.75,
            "max_var": 1.5,
            "dev": 8.33
        }
    })
}

/// `osd perf` from Nautilus on
pub fn osd_perf_nautilus() -> Value {
    json!({
        "osdstats": {
            "osd_perf_infos": [
                {"id": 0, "perf_stats": {"commit_latency_ms": 4, "apply_latency_ms": 4}},
                {"id": 1, "perf_stats": {"commit_latency_ms": 7, "apply_latency_ms": 7}},
                {"id": 2, "perf_stats": {"commit_latency_ms": 1, "apply_latency_ms": 1}}
            ]
        }
    })
}

/// `osd perf` before Nautilus
pub fn osd_perf_luminous() -> Value {
    json!({
        "osd_perf_infos": [
            {"id": 1, "perf_stats": {"commit_latency_ms": 7, "apply_latency_ms": 7}}
        ]
    })
}

pub fn osd_dump() -> Value {
    json!({
        "epoch": 412,
        "full_ratio": 0.95,
        "backfillfull_ratio": 0.9,
        "nearfull_ratio": 0.85,
        "flags": "noout,sortbitwise,recovery_deletes,purged_snapdirs,pglog_hardlimit",
        "osds": [
            {"osd": 0, "up": 1, "in": 1, "weight": 1.0},
            {"osd": 1, "up": 1, "in": 1, "weight": 1.0},
            {"osd": 2, "up": 0, "in": 1, "weight": 1.0}
        ],
        "pg_upmap_items": [
            {"pgid": "1.7", "mappings": [{"from": 0, "to": 2}]}
        ]
    })
}

pub fn quorum_status() -> Value {
    json!({
        "election_epoch": 24,
        "quorum": [0, 1],
        "quorum_names": ["a", "b"],
        "quorum_leader_name": "a",
        "monmap": {
            "epoch": 3,
            "mons": [
                {"rank": 0, "name": "a", "addr": "10.0.0.1:6789/0"},
                {"rank": 1, "name": "b", "addr": "10.0.0.2:6789/0"},
                {"rank": 2, "name": "c", "addr": "10.0.0.3:6789/0"}
            ]
        }
    })
}

pub fn time_sync_status() -> Value {
    json!({
        "time_skew_status": {
            "a": {"skew": 0.0, "latency": 0.0, "health": "HEALTH_OK"},
            "b": {"skew": 0.05, "latency": 0.001, "health": "HEALTH_OK"}
        },
        "timechecks": {"epoch": 24, "round": 12, "round_status": "finished"}
    })
}

pub fn versions() -> Value {
    json!({
        "mon": {
            "ceph version 16.2.11 (3cf40e2dca667f68c6ce3ff5cd94f01e711af894) pacific (stable)": 3
        },
        "osd": {
            "ceph version 16.2.11 (3cf40e2dca667f68c6ce3ff5cd94f01e711af894) pacific (stable)": 5,
            "ceph version 16.2.10 (45fa1a083152e41a408d15505f594ec5f1b4fe17) pacific (stable)": 1
        },
        "overall": {
            "ceph version 16.2.11 (3cf40e2dca667f68c6ce3ff5cd94f01e711af894) pacific (stable)": 8,
            "ceph version 16.2.10 (45fa1a083152e41a408d15505f594ec5f1b4fe17) pacific (stable)": 1
        }
    })
}

pub fn crash_ls() -> Value {
    json!([
        {"crash_id": "2024-02-01T10:00:00.000000Z_1", "timestamp": "2024-02-01T10:00:00.000000Z", "entity_name": "osd.3"},
        {"crash_id": "2024-02-02T10:00:00.000000Z_2", "timestamp": "2024-02-02T10:00:00.000000Z", "entity_name": "osd.3", "archived": null},
        {"crash_id": "2024-01-05T08:00:00.000000Z_3", "timestamp": "2024-01-05T08:00:00.000000Z", "entity_name": "mgr.a", "archived": "2024-01-06 09:00:00.000000"}
    ])
}

/// `service dump` listing one rbd-mirror daemon when `mirror` is set
pub fn service_dump(mirror: bool) -> Value {
    let daemons = if mirror {
        json!({"summary": "", "4567": {"start_epoch": 10, "gid": 4567, "metadata": {"hostname": "node-a"}}})
    } else {
        json!({"summary": ""})
    };

    json!({
        "epoch": 12,
        "services": {
            "rbd-mirror": {"daemons": daemons, "summary": ""},
            "rgw": {"daemons": {"summary": "", "rgw.a": {"gid": 4800}}, "summary": ""}
        }
    })
}

/// `radosgw-admin gc list --include-all`: one expired task, one far in the future
pub fn gc_list() -> Value {
    json!([
        {
            "tag": "a4d5b8c2-2f3e-4b6a-9c1d-1:123",
            "time": "2001-01-01 00:00:00.0.123456s",
            "objs": [
                {"pool": "default.rgw.buckets.data", "oid": "obj1", "key": "", "instance": ""},
                {"pool": "default.rgw.buckets.data", "oid": "obj2", "key": "", "instance": ""}
            ]
        },
        {
            "tag": "a4d5b8c2-2f3e-4b6a-9c1d-1:124",
            "time": "2999-01-01 00:00:00.0.5s",
            "objs": [
                {"pool": "default.rgw.buckets.data", "oid": "obj3", "key": "", "instance": ""}
            ]
        }
    ])
}

pub fn fs_dump() -> Value {
    json!({
        "epoch": 8,
        "default_fscid": 1,
        "filesystems": [{
            "id": 1,
            "mdsmap": {
                "fs_name": "cephfs",
                "max_mds": 1,
                "info": {
                    "gid_4123": {"gid": 4123, "name": "a", "rank": 0, "state": "up:active", "addr": "10.0.0.1:6800/1"}
                }
            }
        }],
        "standbys": [
            {"gid": 4200, "name": "b", "rank": -1, "state": "up:standby", "addr": "10.0.0.2:6800/1"}
        ]
    })
}

/// `ceph tell mds.a ops`: one op older than 30s
pub fn mds_ops() -> Value {
    json!({
        "ops": [
            {
                "description": "client_request(client.4150:27 getattr pAsLsXsFs #0x1 2024-03-01T12:00:00.000000+0000 caller_uid=0, caller_gid=0{})",
                "initiated_at": "2024-03-01T12:00:00.000000+0000",
                "age": 45.2,
                "duration": 45.2,
                "type_data": {"flag_point": "failed to rdlock, waiting", "reqid": "client.4150:27", "op_type": "client_request"}
            },
            {
                "description": "client_request(client.4150:28 lookup #0x1/dir 2024-03-01T12:00:44.000000+0000 caller_uid=0, caller_gid=0{})",
                "initiated_at": "2024-03-01T12:00:44.000000+0000",
                "age": 1.2,
                "duration": 1.2,
                "type_data": {"flag_point": "dispatched", "reqid": "client.4150:28", "op_type": "client_request"}
            }
        ],
        "num_ops": 2
    })
}
