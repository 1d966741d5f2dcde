//! Wire-level constants: fixed sizes, opcodes, and backup layout.

// ---------------------------------------------------------------------
// Fixed encoded sizes (§4.2)
// ---------------------------------------------------------------------

/// Size of a packed 32-bit integer.
pub const OR_INT_SIZE: usize = 4;
/// Size of a packed 64-bit integer after 8-byte alignment.
pub const OR_BIGINT_ALIGNED_SIZE: usize = 8;
/// Size of a packed OID (volid, pageid, slotid, groupid).
pub const OR_OID_SIZE: usize = 16;
/// Size of a packed HFID (volid + file id).
pub const OR_HFID_SIZE: usize = 12;
/// Size of a packed BTID after alignment.
pub const OR_BTID_ALIGNED_SIZE: usize = 12;
/// Size of a packed LSA after alignment.
pub const OR_LSA_ALIGNED_SIZE: usize = 12;
/// Size of a packed XASL id.
pub const OR_XASL_ID_SIZE: usize = 16;

/// Alignment boundary applied before any 64-bit integer, LSA, or other
/// aligned scalar.
pub const OR_ALIGNMENT: usize = 8;

// ---------------------------------------------------------------------
// Request opcodes (NET_SERVER_*): a closed enumeration whose numeric
// values must match the server build.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    LocatorFetch = 1,
    LocatorForce = 2,
    LocatorReplForce = 3,
    LocatorFetchLockset = 4,
    LocatorFetchLockhintClasses = 5,
    LocatorFindClassOid = 6,
    LocatorReserveClassNames = 7,
    LocatorDeleteClassName = 8,
    LocatorRenameClassName = 9,
    LocatorAssignOid = 10,

    HeapCreate = 20,
    HeapDestroy = 21,

    BtreeAddIndex = 30,
    BtreeLoadData = 31,
    BtreeDeleteIndex = 32,
    BtreeFindUnique = 33,

    TranServerCommit = 40,
    TranServerAbort = 41,
    TranServerSavepoint = 42,
    TranServerPartialAbort = 43,
    LogCheckpoint = 44,
    LogResetWaitMsecs = 45,

    CsessionFindOrCreateSession = 50,
    CsessionEndSession = 51,

    ChangeServerParameters = 60,
    ObtainServerParameters = 61,
    GetForceServerParameters = 62,

    StatsGetStatistics = 70,
    StatsUpdateStatistics = 71,
    MntServerCopyStats = 72,
    MntServerGlobalStats = 73,
    LogtbGetPackTranTable = 74,

    QmgrPrepareQuery = 80,
    QmgrExecuteQuery = 81,
    QmgrEndQuery = 82,
    QmgrGetListFilePage = 83,
    QmgrDropQueryPlan = 84,
    QmgrDropAllQueryPlans = 85,

    BackupPrepare = 90,
    BackupVolume = 91,
    BackupLogVolume = 92,

    /// Dump-style commands using `recv_stream`.
    LockDump = 100,
    CsServerStatDump = 101,
    ParamDump = 102,
    QueryPlanDump = 103,
}

// ---------------------------------------------------------------------
// Reply header "server request kind" used by execute/fetch (§4.5).
// ---------------------------------------------------------------------

pub const QUERY_END: u32 = 0;

// ---------------------------------------------------------------------
// Backup layout (§4.8, §6)
// ---------------------------------------------------------------------

pub const BK_BACKUP_HEADER_IO_SIZE: usize = 4096;
pub const BK_BACKUP_PAGE_OVERHEAD: usize = 32;
pub const FULL_LEVEL_EXP: usize = 1;
pub const BK_BACKUP_MINIMUM_NUM_PAGES_FULL_LEVEL: u64 = 4;
pub const BK_BACKUP_NUM_THREADS_AUTO: i32 = 0;
pub const BK_BACKUP_SLEEP_MSECS_AUTO: i32 = -1;
pub const END_PAGE_ID: i32 = -2;
pub const NULL_PAGEID: i32 = -1;

/// Backup packet types multiplexed over one long-lived request (§4.8 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPacketType {
    VolStart,
    VolEnd,
    Data,
    VolsBackupEnd,
    LogsBackupEnd,
}
