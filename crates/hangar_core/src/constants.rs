pub mod queues {
    pub const WAITING: &str = "hangar-job-waiting-queue";
    pub const RUNNING: &str = "hangar-job-running-queue";
}

pub mod tables {
    pub const JOBS: &str = "HangarJobTable";
    pub const AVAILABILITY: &str = "HangarMachineAvailabilityTable";
}

pub mod machine {
    /// Marker file written as the last step of the bootstrap script.
    pub const SENTINEL: &str = "/var/lib/hangar/initialized";

    pub const DEFAULT_IMAGE: &str = "ami-0f6b4f4104d26f399";
    pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";
    pub const DEFAULT_DEVICE: &str = "/dev/sda1";
    pub const DEFAULT_VOLUME_GB: i32 = 500;
    pub const DEFAULT_NAME: &str = "hangar";
}

pub mod notify {
    pub const DEFAULT_USERNAME: &str = "hangar";
}

pub mod routes {
    pub const HEALTH: &str = "/health";

    pub const JOBS: &str = "/jobs";
    pub const JOBS_BY_ID: &str = "/jobs/{id}";
    pub const JOBS_DISPATCH: &str = "/jobs/dispatch";
    pub const JOBS_COLLECT: &str = "/jobs/collect";
}
