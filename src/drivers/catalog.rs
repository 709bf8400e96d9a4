//! Built-in driver schemas.
//!
//! One function per provider. Options are declared in the order the
//! provider documents them; `updatable` marks the few fields a provider can
//! change on a live machine (tags, monitoring and similar toggles). Anything
//! else mismatching forces a re-create.

use super::{DriverSchema, OptionKind, OptionSpec};

use OptionKind::{Bool, Int, Str};

fn opt(name: &str, kind: OptionKind, description: &str) -> OptionSpec {
    OptionSpec::new(name, kind, description)
}

/// All built-in drivers, in alphabetical order.
pub fn builtin_drivers() -> Vec<DriverSchema> {
    vec![
        amazonec2(),
        azure(),
        digitalocean(),
        exoscale(),
        generic(),
        google(),
        hyperv(),
        openstack(),
        rackspace(),
        softlayer(),
        virtualbox(),
        vmwarefusion(),
        vmwarevcloudair(),
        vmwarevsphere(),
    ]
}

pub fn amazonec2() -> DriverSchema {
    DriverSchema::new("amazonec2", "Amazon Web Services EC2 instance")
        .option(opt("access_key", Str, "AWS access key").required())
        .option(opt("secret_key", Str, "AWS secret key").required())
        .option(opt("vpc_id", Str, "VPC to launch the instance in").required())
        .option(opt("session_token", Str, "AWS session token"))
        .option(opt("ami", Str, "AMI id"))
        .option(opt("region", Str, "AWS region"))
        .option(opt("zone", Str, "Availability zone letter"))
        .option(opt("subnet_id", Str, "Subnet id"))
        .option(opt("security_group", Str, "Security group name"))
        .option(opt("instance_type", Str, "Instance type"))
        .option(opt("root_size", Str, "Root disk size in GB"))
        .option(opt("iam_instance_profile", Str, "IAM instance profile"))
        .option(opt("ssh_user", Str, "SSH login user"))
        .option(opt("request_spot_instance", Bool, "Request a spot instance"))
        .option(opt("spot_price", Str, "Spot instance bid price"))
        .option(opt("private_address_only", Bool, "Only use a private address"))
        .option(opt("monitoring", Bool, "Enable CloudWatch detailed monitoring").updatable())
}

pub fn azure() -> DriverSchema {
    DriverSchema::new("azure", "Microsoft Azure virtual machine")
        .option(opt("subscription_id", Str, "Azure subscription id").required())
        .option(opt("location", Str, "Azure region"))
        .option(opt("resource_group", Str, "Resource group"))
        .option(opt("size", Str, "VM size"))
        .option(opt("ssh_user", Str, "SSH login user"))
        .option(opt("vnet", Str, "Virtual network"))
        .option(opt("subnet", Str, "Subnet name"))
        .option(opt("subnet_prefix", Str, "Subnet address prefix"))
        .option(opt("availability_set", Str, "Availability set"))
        .option(opt("open_port", Str, "Extra port to open in the security group").updatable())
        .option(opt("private_ip_address", Str, "Static private IP address"))
        .option(opt("use_private_ip", Bool, "Connect over the private IP"))
        .option(opt("no_public_ip", Bool, "Do not create a public IP"))
        .option(opt("static_public_ip", Str, "Use a static public IP"))
        .option(opt("docker_port", Int, "Docker engine port"))
        .option(opt("environment", Str, "Azure environment"))
}

pub fn digitalocean() -> DriverSchema {
    DriverSchema::new("digitalocean", "DigitalOcean droplet")
        .option(opt("access_token", Str, "API access token"))
        .option(opt("image", Str, "Droplet image"))
        .option(opt("region", Str, "Droplet region"))
        .option(opt("size", Str, "Droplet size"))
        .option(opt("ipv6", Bool, "Enable IPv6").updatable())
        .option(opt("private_networking", Bool, "Enable private networking").updatable())
        .option(opt("backups", Bool, "Enable backups").updatable())
        .option(opt("userdata", Str, "Path to user data file"))
        .option(opt("ssh_user", Str, "SSH login user"))
        .option(opt("ssh_port", Str, "SSH port"))
        .option(opt("ssh_key_fingerprint", Str, "Fingerprint of an existing SSH key"))
}

pub fn exoscale() -> DriverSchema {
    DriverSchema::new("exoscale", "Exoscale compute instance")
        .option(opt("api_key", Str, "API key").required())
        .option(opt("api_secret_key", Str, "API secret key").required())
        .option(opt("url", Str, "API endpoint"))
        .option(opt("instance_profile", Str, "Instance profile"))
        .option(opt("disk_size", Str, "Disk size in GB"))
        .option(opt("image", Str, "Template name"))
        .option(opt("security_group", Str, "Security group").updatable())
        .option(opt("availability_zone", Str, "Availability zone"))
        .option(opt("ssh_user", Str, "SSH login user"))
        .option(opt("userdata", Str, "Path to user data file"))
}

pub fn generic() -> DriverSchema {
    DriverSchema::new("generic", "Existing host reachable over SSH")
        .option(opt("ip_address", Str, "IP address of the host").required())
        .option(opt("ssh_user", Str, "SSH login user").updatable())
        .option(opt("ssh_key", Str, "SSH private key path").updatable())
        .option(opt("ssh_port", Str, "SSH port").updatable())
}

pub fn google() -> DriverSchema {
    DriverSchema::new("google", "Google Compute Engine instance")
        .option(opt("project", Str, "GCE project").required())
        .option(opt("zone", Str, "GCE zone"))
        .option(opt("machine_type", Str, "Machine type"))
        .option(opt("machine_image", Str, "Machine image"))
        .option(opt("username", Str, "SSH login user"))
        .option(opt("scopes", Str, "Access scopes"))
        .option(opt("disk_size", Str, "Disk size in GB"))
        .option(opt("disk_type", Str, "Disk type"))
        .option(opt("address", Str, "Static external address"))
        .option(opt("preemptible", Str, "Preemptible instance"))
        .option(opt("tags", Str, "Comma separated network tags").updatable())
        .option(opt("use_internal_ip", Str, "Connect over the internal IP"))
}

pub fn hyperv() -> DriverSchema {
    DriverSchema::new("hyperv", "Microsoft Hyper-V virtual machine")
        .option(opt("boot2docker_url", Str, "URL of the boot2docker ISO"))
        .option(opt("virtual_switch", Str, "Virtual switch name"))
        .option(opt("disk_size", Str, "Disk size in MB"))
        .option(opt("memory", Str, "Memory size in MB"))
        .option(opt("cpu_count", Int, "Number of CPUs"))
        .option(opt("static_macaddress", Str, "Static MAC address"))
        .option(opt("vlan_id", Str, "VLAN id"))
}

pub fn openstack() -> DriverSchema {
    DriverSchema::new("openstack", "OpenStack compute instance")
        .option(opt("auth_url", Str, "Keystone endpoint"))
        .option(opt("flavor_name", Str, "Flavor name"))
        .option(opt("flavor_id", Str, "Flavor id"))
        .option(opt("image_name", Str, "Image name"))
        .option(opt("image_id", Str, "Image id"))
        .option(opt("insecure", Str, "Skip TLS verification"))
        .option(opt("domain_name", Str, "Domain name"))
        .option(opt("domain_id", Str, "Domain id"))
        .option(opt("username", Str, "User name"))
        .option(opt("password", Str, "Password"))
        .option(opt("tenant_name", Str, "Tenant name"))
        .option(opt("tenant_id", Str, "Tenant id"))
        .option(opt("region", Str, "Region"))
        .option(opt("availability_zone", Str, "Availability zone"))
        .option(opt("endpoint_type", Str, "Endpoint type"))
        .option(opt("net_name", Str, "Network name"))
        .option(opt("net_id", Str, "Network id"))
        .option(opt("sec_groups", Str, "Comma separated security groups").updatable())
        .option(opt("floatingip_pool", Str, "Floating IP pool"))
        .option(opt("ip_version", Str, "IP version"))
        .option(opt("ssh_user", Str, "SSH login user"))
        .option(opt("ssh_port", Str, "SSH port"))
        .option(opt("active_timeout", Str, "Seconds to wait for the instance"))
        .exclusive(&["flavor_name", "flavor_id"])
        .exclusive(&["image_name", "image_id"])
        .exclusive(&["domain_name", "domain_id"])
        .exclusive(&["tenant_name", "tenant_id"])
        .exclusive(&["net_name", "net_id"])
}

pub fn rackspace() -> DriverSchema {
    DriverSchema::new("rackspace", "Rackspace cloud server")
        .option(opt("username", Str, "Rackspace account username").required())
        .option(opt("api_key", Str, "Rackspace API key").required())
        .option(opt("region", Str, "Rackspace region name").required())
        .option(opt("endpoint_type", Str, "adminURL, internalURL or publicURL"))
        .option(opt("image_id", Str, "Image id"))
        .option(opt("flavor_id", Str, "Flavor id"))
        .option(opt("ssh_user", Str, "SSH login user"))
        .option(opt("ssh_port", Str, "SSH port"))
        .option(opt("docker_install", Str, "Install Docker on the machine"))
}

pub fn softlayer() -> DriverSchema {
    DriverSchema::new("softlayer", "IBM SoftLayer virtual server")
        .option(opt("user", Str, "Account user name").required())
        .option(opt("api_key", Str, "API key").required())
        .option(opt("domain", Str, "Domain name of the machine").required())
        .option(opt("memory", Str, "Memory in MB"))
        .option(opt("disk_size", Str, "Disk size in GB"))
        .option(opt("region", Str, "Datacenter"))
        .option(opt("cpu", Str, "Number of CPUs"))
        .option(opt("hostname", Str, "Host name"))
        .option(opt("api_endpoint", Str, "API endpoint"))
        .option(opt("hourly_billing", Str, "Use hourly billing"))
        .option(opt("local_disk", Str, "Use local disk"))
        .option(opt("private_net_only", Str, "Private network only"))
        .option(opt("image", Str, "OS image"))
        .option(opt("public_vlan_id", Str, "Public VLAN id"))
        .option(opt("private_vlan_id", Str, "Private VLAN id"))
}

pub fn virtualbox() -> DriverSchema {
    DriverSchema::new("virtualbox", "Local VirtualBox virtual machine")
        .option(opt("memory", Int, "Memory in MB"))
        .option(opt("cpu_count", Int, "Number of CPUs"))
        .option(opt("disk_size", Int, "Disk size in MB"))
        .option(opt("host_dns_resolver", Bool, "Use the host DNS resolver"))
        .option(opt("boot2docker_url", Str, "URL of the boot2docker ISO"))
        .option(opt("import_boot2docker_vm", Str, "Existing boot2docker VM to import"))
        .option(opt("hostonly_cidr", Str, "Host-only adapter CIDR"))
        .option(opt("hostonly_nictype", Str, "Host-only NIC type"))
        .option(opt("hostonly_nicpromisc", Str, "Host-only NIC promiscuous mode"))
        .option(opt("no_share", Bool, "Disable home directory sharing"))
        .option(opt("no_dns_proxy", Bool, "Disable the NAT DNS proxy"))
        .option(opt("no_vtx_check", Bool, "Skip the VT-X check"))
}

pub fn vmwarefusion() -> DriverSchema {
    DriverSchema::new("vmwarefusion", "Local VMware Fusion virtual machine")
        .option(opt("boot2docker_url", Str, "URL of the boot2docker ISO"))
        .option(opt("cpu_count", Int, "Number of CPUs"))
        .option(opt("disk_size", Int, "Disk size in MB"))
        .option(opt("memory_size", Int, "Memory in MB"))
        .option(opt("no_share", Bool, "Disable home directory sharing"))
}

pub fn vmwarevcloudair() -> DriverSchema {
    DriverSchema::new("vmwarevcloudair", "VMware vCloud Air virtual machine")
        .option(opt("username", Str, "vCloud Air user name").required())
        .option(opt("password", Str, "vCloud Air password").required())
        .option(opt("computeid", Str, "Compute id"))
        .option(opt("vdcid", Str, "Virtual data center id"))
        .option(opt("orgvdcnetwork", Str, "Organisation VDC network"))
        .option(opt("edgegateway", Str, "Edge gateway"))
        .option(opt("publicip", Str, "Org public IP"))
        .option(opt("catalog", Str, "Catalog name"))
        .option(opt("catalogitem", Str, "Catalog item"))
        .option(opt("provision", Bool, "Install Docker on provision"))
        .option(opt("cpu_count", Int, "Number of CPUs"))
        .option(opt("memory_size", Int, "Memory in MB"))
        .option(opt("ssh_port", Int, "SSH port"))
        .option(opt("docker_port", Int, "Docker engine port"))
}

pub fn vmwarevsphere() -> DriverSchema {
    DriverSchema::new("vmwarevsphere", "VMware vSphere virtual machine")
        .option(opt("username", Str, "vSphere user name").required())
        .option(opt("password", Str, "vSphere password").required())
        .option(opt("cpu_count", Int, "Number of CPUs"))
        .option(opt("memory_size", Int, "Memory in MB"))
        .option(opt("boot2docker_url", Str, "URL of the boot2docker ISO"))
        .option(opt("vcenter", Str, "vCenter host"))
        .option(opt("vcenter_port", Int, "vCenter port"))
        .option(opt("disk_size", Int, "Disk size in MB"))
        .option(opt("network", Str, "Network"))
        .option(opt("datastore", Str, "Datastore"))
        .option(opt("datacenter", Str, "Datacenter"))
        .option(opt("pool", Str, "Resource pool"))
        .option(opt("hostsystem", Str, "ESXi host system"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_driver_names_are_unique() {
        let drivers = builtin_drivers();
        let names: HashSet<_> = drivers.iter().map(|d| d.name.clone()).collect();
        assert_eq!(names.len(), drivers.len());
    }

    #[test]
    fn test_option_names_are_unique_per_driver() {
        for driver in builtin_drivers() {
            let names: HashSet<_> = driver.options.iter().map(|o| o.name.as_str()).collect();
            assert_eq!(names.len(), driver.options.len(), "duplicate option in {}", driver.name);
        }
    }

    #[test]
    fn test_exclusive_groups_reference_known_options() {
        for driver in builtin_drivers() {
            for group in &driver.exclusive {
                for name in group {
                    assert!(driver.get(name).is_some(), "{} has no option {}", driver.name, name);
                }
            }
        }
    }

    #[test]
    fn test_immutable_core_fields() {
        assert!(!digitalocean().get("image").unwrap().updatable);
        assert!(!amazonec2().get("instance_type").unwrap().updatable);
        assert!(google().get("tags").unwrap().updatable);
    }
}
